use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::{AppState, MessageResponse};
use common::solana::is_valid_address;

#[derive(Deserialize)]
pub struct CreateAgentRequest {
    pub user_id: String,
    pub username: Option<String>,
}

/// One slider + qualitative bin pair from the onboarding behavior form.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BehaviorSetting {
    pub slider: i64,
    pub option: String,
}

#[derive(Deserialize)]
pub struct UpdateAgentRequest {
    pub username: Option<String>,
    pub name: Option<String>,
    pub card: Option<String>,
    pub wallet_address: Option<String>,
    pub liquidity: Option<BehaviorSetting>,
    pub project_history: Option<BehaviorSetting>,
    pub market_cap: Option<BehaviorSetting>,
    pub social_sentiment: Option<BehaviorSetting>,
    pub whale_movements: Option<BehaviorSetting>,
    pub risk_tolerance: Option<BehaviorSetting>,
}

#[derive(Serialize)]
pub struct AgentResponse {
    pub user_id: String,
    pub username: Option<String>,
    pub is_onboarded: bool,
    pub name: Option<String>,
    pub card: Option<String>,
    pub wallet_address: Option<String>,
    pub liquidity: BehaviorSetting,
    pub project_history: BehaviorSetting,
    pub market_cap: BehaviorSetting,
    pub social_sentiment: BehaviorSetting,
    pub whale_movements: BehaviorSetting,
    pub risk_tolerance: BehaviorSetting,
    pub current_sol: Option<f64>,
    pub current_usd: Option<f64>,
}

#[derive(Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub username: Option<String>,
    pub name: Option<String>,
    pub card: Option<String>,
    pub current_sol: Option<f64>,
    pub current_usd: Option<f64>,
}

type ApiError = (StatusCode, Json<MessageResponse>);

fn internal_error(msg: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MessageResponse {
            message: msg.to_string(),
        }),
    )
}

fn not_found(msg: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(MessageResponse {
            message: msg.to_string(),
        }),
    )
}

/// Create a user plus its (empty) agent record. The onboarding wizard fills
/// in persona details afterwards via `update_agent`.
pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.user_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "user_id must not be empty".to_string(),
            }),
        ));
    }

    let user_id = req.user_id.clone();
    let username = req.username.clone();
    let created = state
        .db
        .call_named("agents.create", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (user_id, username) VALUES (?1, ?2)",
                rusqlite::params![user_id, username],
            )?;
            let changed = conn.execute(
                "INSERT OR IGNORE INTO agents (user_id) VALUES (?1)",
                rusqlite::params![user_id],
            )?;
            Ok(changed)
        })
        .await
        .map_err(|_db_err| internal_error("failed to create agent"))?;

    if created == 0 {
        return Err((
            StatusCode::CONFLICT,
            Json(MessageResponse {
                message: format!("agent already exists for user {}", req.user_id),
            }),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("agent created for user {}", req.user_id),
        }),
    ))
}

/// Persona/behavior write from the onboarding review step, plus the wallet
/// address captured by wallet connection. Marks the user onboarded.
pub async fn update_agent(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<UpdateAgentRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Some(ref addr) = req.wallet_address {
        if !is_valid_address(addr) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(MessageResponse {
                    message: format!("invalid wallet address: {addr}"),
                }),
            ));
        }
    }

    let uid = user_id.clone();
    let updated = state
        .db
        .call_named("agents.update", move |conn| {
            // Absent settings keep their stored value, so a wallet-only
            // update cannot wipe the persona.
            let behavior = |b: &Option<BehaviorSetting>| {
                let b = b.clone();
                (b.as_ref().map(|b| b.slider), b.map(|b| b.option))
            };
            let (liq_num, liq_bin) = behavior(&req.liquidity);
            let (his_num, his_bin) = behavior(&req.project_history);
            let (cap_num, cap_bin) = behavior(&req.market_cap);
            let (sen_num, sen_bin) = behavior(&req.social_sentiment);
            let (wha_num, wha_bin) = behavior(&req.whale_movements);
            let (ris_num, ris_bin) = behavior(&req.risk_tolerance);

            let changed = conn.execute(
                "UPDATE agents SET
                     name = COALESCE(?1, name),
                     card = COALESCE(?2, card),
                     wallet_address = COALESCE(?3, wallet_address),
                     liquidity_num = COALESCE(?4, liquidity_num),
                     liquidity_bin = COALESCE(?5, liquidity_bin),
                     history_num = COALESCE(?6, history_num),
                     history_bin = COALESCE(?7, history_bin),
                     market_cap_num = COALESCE(?8, market_cap_num),
                     market_cap_bin = COALESCE(?9, market_cap_bin),
                     sentiment_num = COALESCE(?10, sentiment_num),
                     sentiment_bin = COALESCE(?11, sentiment_bin),
                     whale_num = COALESCE(?12, whale_num),
                     whale_bin = COALESCE(?13, whale_bin),
                     risk_num = COALESCE(?14, risk_num),
                     risk_bin = COALESCE(?15, risk_bin),
                     last_updated_at = datetime('now')
                 WHERE user_id = ?16",
                rusqlite::params![
                    req.name,
                    req.card,
                    req.wallet_address,
                    liq_num,
                    liq_bin,
                    his_num,
                    his_bin,
                    cap_num,
                    cap_bin,
                    sen_num,
                    sen_bin,
                    wha_num,
                    wha_bin,
                    ris_num,
                    ris_bin,
                    uid,
                ],
            )?;
            if changed > 0 {
                conn.execute(
                    "UPDATE users SET username = COALESCE(?1, username), is_onboarded = 1
                     WHERE user_id = ?2",
                    rusqlite::params![req.username, uid],
                )?;
            }
            Ok(changed)
        })
        .await
        .map_err(|_db_err| internal_error("failed to update agent"))?;

    if updated == 0 {
        return Err(not_found(&format!("no agent for user {user_id}")));
    }

    Ok(Json(MessageResponse {
        message: format!("agent updated for user {user_id}"),
    }))
}

pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<AgentResponse>, ApiError> {
    let uid = user_id.clone();
    let agent = state
        .db
        .call_named("agents.get", move |conn| {
            let setting = |row: &rusqlite::Row<'_>, num: usize| -> rusqlite::Result<BehaviorSetting> {
                Ok(BehaviorSetting {
                    slider: row.get(num)?,
                    option: row.get::<_, Option<String>>(num + 1)?.unwrap_or_default(),
                })
            };
            let row = conn
                .query_row(
                    "SELECT a.user_id, u.username, u.is_onboarded, a.name, a.card,
                            a.wallet_address,
                            a.liquidity_num, a.liquidity_bin,
                            a.history_num, a.history_bin,
                            a.market_cap_num, a.market_cap_bin,
                            a.sentiment_num, a.sentiment_bin,
                            a.whale_num, a.whale_bin,
                            a.risk_num, a.risk_bin,
                            a.current_sol, a.current_usd
                     FROM agents a JOIN users u ON u.user_id = a.user_id
                     WHERE a.user_id = ?1",
                    rusqlite::params![uid],
                    |row| {
                        Ok(AgentResponse {
                            user_id: row.get(0)?,
                            username: row.get(1)?,
                            is_onboarded: row.get::<_, i64>(2)? != 0,
                            name: row.get(3)?,
                            card: row.get(4)?,
                            wallet_address: row.get(5)?,
                            liquidity: setting(row, 6)?,
                            project_history: setting(row, 8)?,
                            market_cap: setting(row, 10)?,
                            social_sentiment: setting(row, 12)?,
                            whale_movements: setting(row, 14)?,
                            risk_tolerance: setting(row, 16)?,
                            current_sol: row.get(18)?,
                            current_usd: row.get(19)?,
                        })
                    },
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            Ok(row)
        })
        .await
        .map_err(|_db_err| internal_error("failed to load agent"))?;

    agent
        .map(Json)
        .ok_or_else(|| not_found(&format!("no agent for user {user_id}")))
}

/// Agents ranked by last snapshotted USD net worth. Agents that have never
/// been valued sort last.
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let rows = state
        .db
        .call_named("agents.leaderboard", |conn| {
            let mut stmt = conn.prepare(
                "SELECT u.username, a.name, a.card, a.current_sol, a.current_usd
                 FROM agents a JOIN users u ON u.user_id = a.user_id
                 ORDER BY a.current_usd IS NULL, a.current_usd DESC
                 LIMIT 100",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(|_db_err| internal_error("failed to load leaderboard"))?;

    let entries = rows
        .into_iter()
        .enumerate()
        .map(
            |(i, (username, name, card, current_sol, current_usd))| LeaderboardEntry {
                rank: i + 1,
                username,
                name,
                card,
                current_sol,
                current_usd,
            },
        )
        .collect();
    Ok(Json(entries))
}

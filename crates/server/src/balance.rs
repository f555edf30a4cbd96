use anyhow::{Context, Result};
use common::db::AsyncDb;
use common::dexscreener::DexScreenerClient;
use common::solana::{is_valid_address, SolanaRpcClient, LAMPORTS_PER_SOL, WRAPPED_SOL_MINT};
use common::types::{BalanceSnapshot, TokenAccountBalance, TokenBalance};
use futures_util::{stream, StreamExt};
use thiserror::Error;
use tracing::debug;

/// Snapshot-fatal failures. Per-token market-data failures are absorbed
/// inside the pipeline (fail-closed) and never surface here.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),
    #[error("ledger unavailable")]
    LedgerUnavailable(#[source] anyhow::Error),
}

/// Read side of the ledger: native balance plus token accounts.
pub trait LedgerReader {
    fn native_balance(&self, address: &str) -> impl std::future::Future<Output = Result<u64>> + Send;
    fn token_holdings(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Vec<TokenAccountBalance>>> + Send;
}

/// Market-data lookups, one HTTP call each. Both are infallible by contract:
/// a failed lookup reads as "not legitimate" / "unpriced".
pub trait TokenMarketData {
    fn is_legitimate(&self, mint: &str) -> impl std::future::Future<Output = bool> + Send;
    fn price_usd(&self, mint: &str) -> impl std::future::Future<Output = Option<f64>> + Send;
}

impl LedgerReader for SolanaRpcClient {
    async fn native_balance(&self, address: &str) -> Result<u64> {
        self.get_balance(address).await
    }

    async fn token_holdings(&self, address: &str) -> Result<Vec<TokenAccountBalance>> {
        self.get_token_accounts(address).await
    }
}

impl TokenMarketData for DexScreenerClient {
    async fn is_legitimate(&self, mint: &str) -> bool {
        DexScreenerClient::is_legitimate(self, mint).await
    }

    async fn price_usd(&self, mint: &str) -> Option<f64> {
        DexScreenerClient::price_usd(self, mint).await
    }
}

/// Compute a full valuation snapshot for one wallet.
///
/// Stages: validate address → native balance → SOL price → token accounts →
/// per-token legitimacy + price (bounded fan-out, at most `max_concurrent`
/// lookups in flight) → sum. The join preserves holding order, so identical
/// external responses always produce identical snapshots.
pub async fn compute_snapshot<L, M>(
    ledger: &L,
    market: &M,
    address: &str,
    max_concurrent: usize,
) -> Result<BalanceSnapshot, BalanceError>
where
    L: LedgerReader + Sync,
    M: TokenMarketData + Sync,
{
    if !is_valid_address(address) {
        return Err(BalanceError::InvalidAddress(address.to_string()));
    }

    let start = std::time::Instant::now();

    let lamports = ledger
        .native_balance(address)
        .await
        .map_err(|e| snapshot_failed(BalanceError::LedgerUnavailable(e)))?;
    let sol_balance = lamports as f64 / LAMPORTS_PER_SOL;

    let sol_price = market.price_usd(WRAPPED_SOL_MINT).await;
    let sol_value = sol_price.map_or(0.0, |p| p * sol_balance);

    let holdings = ledger
        .token_holdings(address)
        .await
        .map_err(|e| snapshot_failed(BalanceError::LedgerUnavailable(e)))?;

    let tokens: Vec<TokenBalance> = stream::iter(
        holdings
            .into_iter()
            .filter(|h| h.ui_amount > 0.0)
            .map(|h| value_holding(market, h)),
    )
    .buffered(max_concurrent.max(1))
    .filter_map(|valued| async move { valued })
    .collect()
    .await;

    let token_usd: f64 = tokens.iter().map(|t| t.usd_value.unwrap_or(0.0)).sum();
    let total_usd_value = sol_value + token_usd;
    let total_sol_value = match sol_price {
        Some(p) if p > 0.0 => total_usd_value / p,
        _ => 0.0,
    };

    metrics::counter!("agents_snapshots_total").increment(1);
    metrics::histogram!("agents_snapshot_duration_ms")
        .record(start.elapsed().as_secs_f64() * 1000.0);
    debug!(
        address = address,
        tokens = tokens.len(),
        total_usd = total_usd_value,
        "snapshot computed"
    );

    Ok(BalanceSnapshot {
        sol_balance,
        sol_value,
        tokens,
        total_usd_value,
        total_sol_value,
    })
}

fn snapshot_failed(err: BalanceError) -> BalanceError {
    metrics::counter!("agents_snapshot_errors_total").increment(1);
    err
}

/// Decide legitimacy and price for one holding. Returns None for tokens that
/// fail the volume heuristic; a legitimate but unpriced token stays in with
/// a zero USD value.
async fn value_holding<M: TokenMarketData>(
    market: &M,
    holding: TokenAccountBalance,
) -> Option<TokenBalance> {
    let (legit, price) = tokio::join!(
        market.is_legitimate(&holding.mint),
        market.price_usd(&holding.mint)
    );

    if !legit {
        metrics::counter!("agents_tokens_filtered_total").increment(1);
        return None;
    }

    let usd_value = price.map_or(0.0, |p| p * holding.ui_amount);
    Some(TokenBalance {
        mint: holding.mint,
        balance: holding.ui_amount,
        decimals: holding.decimals,
        usd_value: Some(usd_value),
    })
}

/// Persist the two snapshot scalars onto the agent row. A distinct failure
/// domain from the snapshot computation itself.
pub async fn write_back_balance(
    db: &AsyncDb,
    user_id: &str,
    snapshot: &BalanceSnapshot,
) -> Result<()> {
    let uid = user_id.to_string();
    let (sol, usd) = (snapshot.total_sol_value, snapshot.total_usd_value);
    let updated = db
        .call_named("agents.write_back_balance", move |conn| {
            Ok(conn.execute(
                "UPDATE agents
                 SET current_sol = ?1, current_usd = ?2, last_updated_at = datetime('now')
                 WHERE user_id = ?3",
                rusqlite::params![sol, usd, uid],
            )?)
        })
        .await?;
    if updated == 0 {
        anyhow::bail!("no agent row for user {user_id}");
    }
    Ok(())
}

/// Agents eligible for a balance refresh: everyone with a stored address.
pub async fn wallets_to_refresh(db: &AsyncDb) -> Result<Vec<(String, String)>> {
    db.call_named("agents.wallets_to_refresh", |conn| {
        let mut stmt = conn.prepare(
            "SELECT user_id, wallet_address FROM agents
             WHERE wallet_address IS NOT NULL
             ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
    .context("failed to list wallets for refresh")
}

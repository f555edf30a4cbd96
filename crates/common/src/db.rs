use anyhow::Result;
use rusqlite::Connection;

/// Synchronous connection — used by tests and one-shot tooling.
pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn run_migrations(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        migrate_agents_balance_columns(&self.conn).map_err(anyhow::Error::from)?;
        Ok(())
    }
}

/// Async database wrapper around `tokio_rusqlite::Connection`.
///
/// Runs all SQLite operations on a dedicated background thread, keeping the
/// Tokio runtime cooperative. Clone is cheap (shared sender to the
/// background thread).
#[derive(Clone)]
pub struct AsyncDb {
    conn: tokio_rusqlite::Connection,
}

impl AsyncDb {
    /// Open a database at `path`, set PRAGMAs (WAL, foreign keys,
    /// busy_timeout) and run migrations on the background thread.
    pub async fn open(path: &str) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(path).await?;
        Self::init(conn).await
    }

    /// In-memory database with the full schema — test and dev use.
    pub async fn open_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
        conn.call(|conn| -> std::result::Result<(), rusqlite::Error> {
            conn.busy_timeout(std::time::Duration::from_secs(30))?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
            conn.execute_batch(SCHEMA)?;
            migrate_agents_balance_columns(conn)?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("AsyncDb::init: {e}"))?;
        Ok(Self { conn })
    }

    /// Run a closure on the background SQLite thread and return the result.
    pub async fn call<F, R>(&self, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.conn.call(move |conn| function(conn)).await.map_err(
            |e: tokio_rusqlite::Error<anyhow::Error>| match e {
                tokio_rusqlite::Error::ConnectionClosed => {
                    anyhow::anyhow!("database connection closed")
                }
                tokio_rusqlite::Error::Close((_, err)) => {
                    anyhow::anyhow!("database close error: {err}")
                }
                tokio_rusqlite::Error::Error(err) => err,
                other => anyhow::anyhow!("database error: {other}"),
            },
        )
    }

    /// Like [`Self::call`], but records latency and error metrics under the
    /// given operation name. Measures full wall-clock time including queueing
    /// on the SQLite thread.
    pub async fn call_named<F, R>(&self, op: &'static str, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let start = std::time::Instant::now();
        let res = self.call(function).await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;

        match &res {
            Ok(_) => {
                metrics::histogram!(
                    "agents_db_query_latency_ms",
                    "op" => op,
                    "status" => "ok"
                )
                .record(ms);
            }
            Err(_) => {
                metrics::histogram!(
                    "agents_db_query_latency_ms",
                    "op" => op,
                    "status" => "err"
                )
                .record(ms);
                metrics::counter!("agents_db_query_errors_total", "op" => op).increment(1);
            }
        }

        res
    }
}

/// Add current_sol / current_usd to agents if missing (for DBs created
/// before balance write-back existed).
fn migrate_agents_balance_columns(conn: &Connection) -> std::result::Result<(), rusqlite::Error> {
    for name in ["current_sol", "current_usd"] {
        let has: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('agents') WHERE name=?1",
            rusqlite::params![name],
            |row| row.get(0),
        )?;
        if has == 0 {
            conn.execute(&format!("ALTER TABLE agents ADD COLUMN {name} REAL"), [])?;
        }
    }
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    username TEXT,
    is_onboarded INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS agents (
    agent_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL UNIQUE REFERENCES users(user_id),
    name TEXT,
    card TEXT,                        -- avatar card id chosen in onboarding
    wallet_address TEXT,              -- base58 Solana account key
    liquidity_num INTEGER NOT NULL DEFAULT 0,
    liquidity_bin TEXT,
    history_num INTEGER NOT NULL DEFAULT 0,
    history_bin TEXT,
    market_cap_num INTEGER NOT NULL DEFAULT 0,
    market_cap_bin TEXT,
    sentiment_num INTEGER NOT NULL DEFAULT 0,
    sentiment_bin TEXT,
    whale_num INTEGER NOT NULL DEFAULT 0,
    whale_bin TEXT,
    risk_num INTEGER NOT NULL DEFAULT 0,
    risk_bin TEXT,
    current_sol REAL,                 -- last snapshot total in SOL
    current_usd REAL,                 -- last snapshot total in USD
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    last_updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_agents_current_usd ON agents(current_usd);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_migrate_in_memory() {
        let db = Database::open(":memory:").unwrap();
        db.run_migrations().unwrap();

        let count: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('users','agents')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Database::open(":memory:").unwrap();
        db.run_migrations().unwrap();
        db.run_migrations().unwrap();
    }

    #[test]
    fn test_balance_column_migration_adds_missing() {
        let db = Database::open(":memory:").unwrap();
        db.conn
            .execute_batch("CREATE TABLE agents (agent_id INTEGER PRIMARY KEY, user_id TEXT)")
            .unwrap();
        migrate_agents_balance_columns(&db.conn).unwrap();

        let has: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('agents') WHERE name IN ('current_sol','current_usd')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(has, 2);
    }

    #[tokio::test]
    async fn test_async_db_insert_and_read_back() {
        let db = AsyncDb::open_memory().await.unwrap();

        db.call(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, username) VALUES ('u1', 'alice')",
                [],
            )?;
            conn.execute(
                "INSERT INTO agents (user_id, name, wallet_address) VALUES ('u1', 'Falcon', 'addr')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let wallet: Option<String> = db
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT wallet_address FROM agents WHERE user_id = 'u1'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(wallet.as_deref(), Some("addr"));
    }

    #[tokio::test]
    async fn test_async_db_balance_write_back() {
        let db = AsyncDb::open_memory().await.unwrap();

        db.call(|conn| {
            conn.execute("INSERT INTO users (user_id) VALUES ('u1')", [])?;
            conn.execute("INSERT INTO agents (user_id) VALUES ('u1')", [])?;
            conn.execute(
                "UPDATE agents SET current_sol = ?1, current_usd = ?2 WHERE user_id = 'u1'",
                rusqlite::params![10.066, 1510.0],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let (sol, usd): (f64, f64) = db
            .call_named("read_balance", |conn| {
                Ok(conn.query_row(
                    "SELECT current_sol, current_usd FROM agents WHERE user_id = 'u1'",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .await
            .unwrap();
        assert!((sol - 10.066).abs() < 1e-9);
        assert!((usd - 1510.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_async_db_duplicate_agent_rejected() {
        let db = AsyncDb::open_memory().await.unwrap();

        db.call(|conn| {
            conn.execute("INSERT INTO users (user_id) VALUES ('u1')", [])?;
            conn.execute("INSERT INTO agents (user_id) VALUES ('u1')", [])?;
            Ok(())
        })
        .await
        .unwrap();

        let res = db
            .call(|conn| {
                conn.execute("INSERT INTO agents (user_id) VALUES ('u1')", [])?;
                Ok(())
            })
            .await;
        assert!(res.is_err());
    }
}

use std::time::Duration;

use common::db::AsyncDb;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::balance::{compute_snapshot, wallets_to_refresh, write_back_balance};
use crate::balance::{LedgerReader, TokenMarketData};

/// Periodic background refresh of every connected wallet. Runs until the
/// cancellation token fires; one wallet failing never aborts the sweep.
pub async fn run<L, M>(
    db: AsyncDb,
    ledger: L,
    market: M,
    interval: Duration,
    max_concurrent: usize,
    cancel: CancellationToken,
) where
    L: LedgerReader + Sync,
    M: TokenMarketData + Sync,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_secs = interval.as_secs(), "balance refresher started");
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("balance refresher stopping");
                break;
            }
            _ = ticker.tick() => {
                refresh_all_once(&db, &ledger, &market, max_concurrent).await;
            }
        }
    }
}

/// One full sweep over every agent with a stored wallet address.
pub async fn refresh_all_once<L, M>(db: &AsyncDb, ledger: &L, market: &M, max_concurrent: usize)
where
    L: LedgerReader + Sync,
    M: TokenMarketData + Sync,
{
    let wallets = match wallets_to_refresh(db).await {
        Ok(wallets) => wallets,
        Err(e) => {
            warn!(error = %e, "refresh sweep aborted");
            metrics::counter!("agents_refresh_errors_total").increment(1);
            return;
        }
    };

    let mut refreshed = 0usize;
    for (user_id, address) in &wallets {
        let snapshot = match compute_snapshot(ledger, market, address, max_concurrent).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "wallet refresh failed");
                metrics::counter!("agents_refresh_errors_total").increment(1);
                continue;
            }
        };
        if let Err(e) = write_back_balance(db, user_id, &snapshot).await {
            warn!(user_id = %user_id, error = %e, "wallet refresh write-back failed");
            metrics::counter!("agents_refresh_errors_total").increment(1);
            continue;
        }
        refreshed += 1;
    }

    metrics::counter!("agents_refresh_sweeps_total").increment(1);
    info!(
        refreshed,
        total = wallets.len(),
        "balance refresh sweep complete"
    );
}

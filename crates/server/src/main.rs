use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod api;
mod balance;
mod metrics;
mod refresher;

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("server", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    info!("sol_agents server starting");

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let server = config
        .server
        .clone()
        .ok_or_else(|| anyhow::anyhow!("config is missing the [server] section"))?;

    if let Some(port) = server.prometheus_port {
        metrics::install_prometheus(port)?;
        metrics::describe();
        info!(port, "prometheus exporter listening");
    }

    let db = common::db::AsyncDb::open(&config.database.path).await?;

    let ledger = Arc::new(common::solana::SolanaRpcClient::new(
        &config.solana.rpc_url,
        Duration::from_secs(config.solana.request_timeout_secs),
    ));
    let market = Arc::new(common::dexscreener::DexScreenerClient::new(
        &config.dexscreener.base_url,
        Duration::from_secs(config.dexscreener.request_timeout_secs),
        config.dexscreener.min_volume_24h_usd,
    ));

    let cancel = CancellationToken::new();
    if config.refresh.enabled {
        tokio::spawn(refresher::run(
            db.clone(),
            ledger.as_ref().clone(),
            market.as_ref().clone(),
            Duration::from_secs(config.refresh.interval_secs),
            config.dexscreener.max_concurrent_lookups,
            cancel.clone(),
        ));
    }

    let state = Arc::new(api::AppState {
        db,
        ledger,
        market,
        max_concurrent_lookups: config.dexscreener.max_concurrent_lookups,
        started_at: chrono::Utc::now(),
        api_key: server.api_key.clone(),
    });

    let app = api::router(state);

    let bind_addr = format!("{}:{}", server.host, server.port);
    info!(addr = %bind_addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let cancel = cancel.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
                cancel.cancel();
            }
        })
        .await?;

    Ok(())
}

use anyhow::Result;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "agents_snapshots_total",
        "Number of wallet balance snapshots computed."
    );
    describe_counter!(
        "agents_snapshot_errors_total",
        "Number of snapshot computations that failed at the ledger."
    );
    describe_counter!(
        "agents_tokens_filtered_total",
        "Number of token holdings excluded by the volume heuristic."
    );
    describe_counter!(
        "agents_market_lookup_errors_total",
        "Number of failed DexScreener token lookups."
    );
    describe_counter!(
        "agents_ledger_rpc_errors_total",
        "Number of failed Solana RPC calls."
    );
    describe_counter!(
        "agents_refresh_sweeps_total",
        "Number of completed background refresh sweeps."
    );
    describe_counter!(
        "agents_refresh_errors_total",
        "Number of per-wallet failures during background refresh."
    );
    describe_counter!(
        "agents_db_query_errors_total",
        "Number of failed database queries."
    );
    describe_histogram!(
        "agents_snapshot_duration_ms",
        "Wallet snapshot computation latency in milliseconds."
    );
    describe_histogram!(
        "agents_db_query_latency_ms",
        "Database query latency in milliseconds."
    );
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_handle_renders_metric_names() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        describe();

        metrics::with_local_recorder(&recorder, || {
            let c = metrics::counter!("agents_snapshots_total");
            c.increment(1);
        });

        let rendered = handle.render();
        assert!(rendered.contains("agents_snapshots_total"));
    }
}

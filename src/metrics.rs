use anyhow::{Context, Result};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::info;

/// Install the Prometheus recorder.
/// Returns a handle that renders the current metrics for scraping
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        // Feed fetch latency: 50ms .. 10s
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "skywatch.feed.fetch_duration_seconds".to_string(),
            ),
            &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .context("failed to set buckets for skywatch.feed.fetch_duration_seconds")?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Initialize poll-loop metrics to zero so they appear in queries before
/// the first event
pub fn initialize_run_metrics() {
    metrics::counter!("skywatch.ticks_total").absolute(0);
    metrics::counter!("skywatch.feed.errors_total").absolute(0);
    metrics::gauge!("skywatch.aircraft.tracking").set(0.0);

    metrics::counter!("skywatch.sightings.recorded_total").absolute(0);
    metrics::counter!("skywatch.sightings.duplicates_total").absolute(0);
    metrics::counter!("skywatch.sightings.storage_errors_total").absolute(0);
    metrics::counter!("skywatch.military.sightings_total").absolute(0);

    for class in ["squawk", "watchlist"] {
        metrics::counter!("skywatch.alerts.dispatched_total", "class" => class).absolute(0);
        metrics::counter!("skywatch.alerts.suppressed_total", "class" => class).absolute(0);
        metrics::counter!("skywatch.alerts.failed_total", "class" => class).absolute(0);
    }
    metrics::gauge!("skywatch.cooldowns.tracked").set(0.0);

    metrics::counter!("skywatch.weather.samples_total").absolute(0);
    metrics::counter!("skywatch.weather.errors_total").absolute(0);

    metrics::counter!("skywatch.sweeps_total").absolute(0);
    metrics::counter!("skywatch.sweeps.failed_total").absolute(0);
    metrics::counter!("skywatch.health_reports_total").absolute(0);
}

/// Uptime and liveness gauges, refreshed every 5 seconds
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs() as f64);
        metrics::gauge!("process.is_up").set(1.0);
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Serve `/metrics` from an installed recorder until the process exits
pub async fn serve_metrics(handle: PrometheusHandle, port: u16) -> Result<()> {
    tokio::spawn(process_metrics_task());

    let app = Router::new().route("/metrics", get(move || async move { handle.render() }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting metrics server on http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server on {addr}"))?;

    axum::serve(listener, app)
        .await
        .context("Metrics server failed")
}

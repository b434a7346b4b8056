use crate::error::TaskwireError;
use anyhow::Result;
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::LazyLock};
use tracing::{error, info};

// Global metrics
pub static EVENTS_DISPATCHED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("taskwire_events_dispatched_total"));
pub static PARSE_ERROR_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("taskwire_parse_errors_total"));
pub static HANDLER_ERROR_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("taskwire_handler_errors_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("taskwire_reconnects_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("taskwire_connected"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "taskwire")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(_handle) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            // Initialize metrics with default values
            EVENTS_DISPATCHED_COUNTER.absolute(0);
            PARSE_ERROR_COUNTER.absolute(0);
            HANDLER_ERROR_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(TaskwireError::MetricsError(e.to_string()).into())
        }
    }
}

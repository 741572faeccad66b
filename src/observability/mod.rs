//! Observability for the aggregator
//!
//! - Metrics through the [`MetricsRecorder`] trait
//! - Structured logging through `tracing`; [`init_tracing`] installs a
//!   `tracing-subscriber` fmt layer filtered by `RUST_LOG` (default `info`)

pub mod recorder;

pub use recorder::{
    noop_metrics, simulated_metrics, MetricType, MetricsRecorder, NoopMetrics, RecordedMetric,
    SharedMetrics, SimulatedMetrics,
};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber. `json` switches to one JSON object per line.
pub fn init_tracing(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}

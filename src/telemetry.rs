use std::sync::Once;

use metrics::{Unit, describe_counter};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Install the global tracing subscriber and register metric descriptions.
///
/// `RUST_LOG` refines the configured base level when set.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let registry = tracing_subscriber::registry()
        .with(env_filter(logging.level))
        .with(ErrorLayer::default());

    match logging.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?,
        LogFormat::Compact => registry.with(fmt::layer().compact().with_target(true)).try_init()?,
    }

    Ok(())
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "snapcache_hit_total",
            Unit::Count,
            "Total number of requests answered from a stored snapshot."
        );
        describe_counter!(
            "snapcache_miss_total",
            Unit::Count,
            "Total number of cache checks that fell through to normal processing."
        );
        describe_counter!(
            "snapcache_write_total",
            Unit::Count,
            "Total number of snapshots persisted."
        );
        describe_counter!(
            "snapcache_write_error_total",
            Unit::Count,
            "Total number of snapshot writes that failed and were skipped."
        );
        describe_counter!(
            "snapcache_wipe_total",
            Unit::Count,
            "Total number of wipe operations executed."
        );
        describe_counter!(
            "snapcache_reconciled_fragments_total",
            Unit::Count,
            "Total number of fragments rendered by the reconciliation endpoint."
        );
    });
}

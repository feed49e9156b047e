use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "postroom_cache_hit_total",
            Unit::Count,
            "Total number of responses served from the response cache."
        );
        describe_counter!(
            "postroom_cache_miss_total",
            Unit::Count,
            "Total number of cacheable requests that reached the handler."
        );
        describe_counter!(
            "postroom_cache_fill_skipped_total",
            Unit::Count,
            "Total number of handler responses that were not stored."
        );
        describe_counter!(
            "postroom_cache_invalidated_total",
            Unit::Count,
            "Total number of cache entries removed by write-triggered invalidation."
        );
        describe_counter!(
            "postroom_cache_invalidation_failed_total",
            Unit::Count,
            "Total number of invalidation targets that could not be purged."
        );
    });
}

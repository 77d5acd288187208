//! Observability infrastructure for Hardstop.
//!
//! Structured logging with consistent spans: one initialization helper and
//! span constructors carrying the run-group and operator identity so every
//! log line can be stitched back to its RunRecord.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for automation).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops. Levels come from `RUST_LOG`
/// (e.g. `info`, `hardstop_engine=debug`).
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for a whole pipeline run.
#[must_use]
pub fn pipeline_span(run_group_id: &str, mode: &str) -> Span {
    tracing::info_span!("pipeline", run_group_id = run_group_id, mode = mode)
}

/// Creates a span for one operator invocation inside a run.
#[must_use]
pub fn operator_span(operator_id: &str, run_group_id: &str, source_id: Option<&str>) -> Span {
    tracing::info_span!(
        "operator",
        operator_id = operator_id,
        run_group_id = run_group_id,
        source_id = source_id.unwrap_or("-"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn span_helpers_create_spans() {
        let span = operator_span("impact.score@1.0.0", "grp-1", Some("nws_active_us"));
        let _guard = span.enter();
        tracing::info!("scored");
    }
}

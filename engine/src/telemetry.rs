//! Logging for the canvass binary
//!
//! Run reports print to stdout, so logs always go to stderr, and the log
//! format follows the report format the CLI was asked for: pretty terminal
//! output for text runs, one JSON object per line under `--json` so a
//! wrapping process can parse both streams.

use crate::handlers::OutputFormat;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for a configured level, scoped to this crate as well as
/// the root so dependency noise stays at the same threshold.
fn filter_directives(log_level: &str) -> String {
    format!("{0},canvass_engine={0}", log_level)
}

/// Install the global subscriber.
///
/// `log_level` comes from `--log` or `core.log_level`; a `RUST_LOG` env var
/// overrides both. A second call is a no-op, so tests sharing a process can
/// each call it.
pub fn init_telemetry(log_level: &str, format: OutputFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(log_level)));

    match format {
        OutputFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .ok();
        }
        OutputFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_scopes_crate_to_configured_level() {
        assert_eq!(filter_directives("debug"), "debug,canvass_engine=debug");
        EnvFilter::try_new(filter_directives("warn")).unwrap();
    }

    #[test]
    fn test_reinit_is_a_noop() {
        init_telemetry("info", OutputFormat::Text);
        init_telemetry("debug", OutputFormat::Json);
    }
}

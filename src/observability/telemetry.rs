use std::sync::Once;
use thiserror::Error;
use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "replgroup=info";

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),
}

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line, for log aggregation.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `replgroup=info`.
pub fn init_tracing(format: LogFormat) -> Result<(), TracingError> {
    match format {
        LogFormat::Json => {
            let subscriber = fmt()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_env_filter(env_filter())
                .finish();
            set_global_default(subscriber)?;
        }
        LogFormat::Pretty => {
            let subscriber = fmt().pretty().with_env_filter(env_filter()).finish();
            set_global_default(subscriber)?;
        }
    }
    Ok(())
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for tests.
///
/// Output is only enabled when `ENABLE_TRACING` is set:
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            let _ = init_tracing(LogFormat::Pretty);
        }
    });
}

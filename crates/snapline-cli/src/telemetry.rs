//! Log subscriber setup.
//!
//! Filter directives come from `SNAPLINE_LOG`, then `RUST_LOG`, then the
//! built-in default. Logs go to stderr so command output on stdout stays
//! machine-readable.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

const DEFAULT_FILTER: &str = "info,snapline_core=info";

fn env_filter() -> EnvFilter {
    std::env::var("SNAPLINE_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_tracing(json: bool) -> Result<(), CliError> {
    let registry = tracing_subscriber::registry().with(env_filter());

    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.map_err(|e| CliError::Telemetry(e.to_string()))
}

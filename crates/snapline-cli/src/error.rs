use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Key(#[from] snapline_core::KeyError),

    #[error(transparent)]
    Config(#[from] snapline_core::ConfigError),

    #[error("{endpoint}: {source}")]
    Fetch {
        endpoint: String,
        #[source]
        source: snapline_core::FetchError,
    },

    #[error("failed to start telemetry: {0}")]
    Telemetry(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Key(_) => 2,
            Self::Config(_) => 3,
            Self::Fetch { .. } => 4,
            Self::Telemetry(_) => 5,
            Self::Serialization(_) => 6,
            Self::Io(_) => 10,
        }
    }
}

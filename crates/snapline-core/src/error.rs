use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::endpoint::EndpointKey;

/// Validation errors for keys and identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("entity id cannot be empty")]
    EmptyEntityId,
    #[error("entity id length {len} exceeds max {max}")]
    EntityIdTooLong { len: usize, max: usize },
    #[error("entity id contains invalid character '{ch}' at index {index}")]
    EntityIdInvalidChar { ch: char, index: usize },

    #[error("endpoint key cannot be empty")]
    EmptyEndpointKey,
    #[error("endpoint key length {len} exceeds max {max}")]
    EndpointKeyTooLong { len: usize, max: usize },
    #[error("endpoint key contains invalid character '{ch}' at index {index}")]
    EndpointKeyInvalidChar { ch: char, index: usize },

    #[error("season {season} is out of range")]
    InvalidSeason { season: u16 },
    #[error("week {week} is out of range 1..={max}")]
    InvalidWeek { week: u8, max: u8 },

    #[error("invalid position '{value}'")]
    InvalidPosition { value: String },
    #[error("invalid data kind '{value}', expected one of schedule, snap_pct, practice_status, usage")]
    InvalidKind { value: String },
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error(transparent)]
    Key(#[from] KeyError),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Load(Box::new(error))
    }
}

/// Classification of an upstream fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Network failure, timeout or 5xx. Retried.
    Transient,
    /// 4xx response. Surfaced immediately.
    ClientError,
    /// Payload arrived but failed validation. Retried, never cached.
    Rejected,
    /// 2xx body that is not JSON.
    Decode,
    /// Breaker denied the call; no network attempt was made.
    CircuitOpen,
    /// Local failure building or routing the request.
    Internal,
}

/// Structured fetch error shared by the executor, pipeline and scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retryable: bool,
    status: Option<u16>,
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into(),
            retryable: true,
            status: None,
        }
    }

    /// Non-2xx response. 408, 429 and 5xx are transient, every other status
    /// is a client error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let transient = status == 408 || status == 429 || status >= 500;
        Self {
            kind: if transient {
                FetchErrorKind::Transient
            } else {
                FetchErrorKind::ClientError
            },
            message: message.into(),
            retryable: transient,
            status: Some(status),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Rejected,
            message: message.into(),
            retryable: true,
            status: None,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Decode,
            message: message.into(),
            retryable: true,
            status: None,
        }
    }

    pub fn circuit_open(endpoint: &EndpointKey) -> Self {
        Self {
            kind: FetchErrorKind::CircuitOpen,
            message: format!("circuit for endpoint '{endpoint}' is open; call skipped"),
            retryable: false,
            status: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Internal,
            message: message.into(),
            retryable: false,
            status: None,
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Transient => "fetch.transient",
            FetchErrorKind::ClientError => "fetch.client_error",
            FetchErrorKind::Rejected => "fetch.rejected",
            FetchErrorKind::Decode => "fetch.decode",
            FetchErrorKind::CircuitOpen => "fetch.circuit_open",
            FetchErrorKind::Internal => "fetch.internal",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

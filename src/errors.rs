use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No HTTP response was received (connect failure, timeout, reset).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("response rejected by validator: {message}")]
    Validation { code: Option<u16>, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("refresh loop detected: {attempts} refresh attempts within {window:?}")]
    RefreshLoop { attempts: u32, window: Duration },
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// Refresh or re-login failed while this caller waited on the shared slot.
    #[error("re-authentication failed: {0}")]
    Reauth(Arc<Error>),
    #[error("credential store error: {0}")]
    Credential(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request cancelled")]
    Cancelled,
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

impl Error {
    /// Status code used to decide whether this is an authentication failure.
    pub fn auth_status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(status.as_u16()),
            Error::Validation { code, .. } => *code,
            Error::Reauth(inner) => inner.auth_status(),
            _ => None,
        }
    }

    pub fn is_auth_failure(&self, statuses: &[u16]) -> bool {
        self.auth_status()
            .is_some_and(|status| statuses.contains(&status))
    }

    /// Rebuilds an owned error from a shared refresh outcome so every waiter
    /// sees the same kind of failure.
    pub(crate) fn from_shared(shared: Arc<Error>) -> Self {
        match shared.as_ref() {
            Error::RefreshLoop { attempts, window } => Error::RefreshLoop {
                attempts: *attempts,
                window: *window,
            },
            Error::Reauth(inner) => Error::Reauth(Arc::clone(inner)),
            _ => Error::Reauth(shared),
        }
    }
}

//! Error taxonomy for the dashboard
//!
//! Errors ride inside channel outcomes and are multicast to every observer,
//! so they carry rendered messages rather than the source error values.

use thiserror::Error;

pub type DashboardResult<T> = Result<T, DashboardError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    /// Network failure or a non-success HTTP status from the backend
    #[error("transport error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The backend rejected the call because the session is no longer valid
    #[error("session expired")]
    SessionExpired,

    /// The backend answered with a payload that does not match the expected shape
    #[error("invalid payload: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DashboardError {
    pub fn transport(message: &str) -> Self {
        Self::Transport {
            status: None,
            message: message.to_string(),
        }
    }

    pub fn http_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => Self::SessionExpired,
            _ => Self::Transport {
                status: Some(status),
                message: message.to_string(),
            },
        }
    }

    pub fn decode(message: &str) -> Self {
        Self::Decode(message.to_string())
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::http_status(status.as_u16(), &err.to_string()),
            None => Self::transport(&err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<config::ConfigError> for DashboardError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

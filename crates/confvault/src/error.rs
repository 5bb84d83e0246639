//! Store errors
//!
//! Every public client call returns either a value or one of these. `NotFound` is an
//! ordinary outcome (the key never existed or was deleted), the rest are failures.

use thiserror::Error;

/// Errors returned by the KV client
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Transport error at {path}{}: {message}", http_status(.status))]
    Transport {
        /// Wire path the request was issued against
        path: String,
        /// HTTP status, absent when the request never got a response
        status: Option<u16>,
        message: String,
    },

    #[error("Unexpected response shape at {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Invalid input: {0}")]
    BadInput(String),
}

impl StoreError {
    pub(crate) fn transport(path: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        StoreError::Transport {
            path: path.to_string(),
            status,
            message: message.into(),
        }
    }

    pub(crate) fn decode(path: &str, message: impl Into<String>) -> Self {
        StoreError::Decode {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// True for the soft-miss outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// HTTP status carried by a transport error
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

fn http_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, StoreError>;

// src/error.rs

//! Error types for envsync

use thiserror::Error;

use crate::sync::ReferenceKind;

/// Errors produced by the environment clients and the reconciliation engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Credentials error: {0}")]
    CredentialsError(String),

    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned HTTP {status} for {method} {path}: {body}")]
    Api {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("{kind} '{key}' not found in environment '{environment}'")]
    NotFound {
        kind: &'static str,
        key: String,
        environment: String,
    },

    #[error("Unexpected API response: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot resolve {kind} reference {reference}: {reason}")]
    Resolution {
        kind: ReferenceKind,
        reference: String,
        reason: String,
    },
}

impl Error {
    /// Shorthand for a `NotFound` error
    pub fn not_found(kind: &'static str, key: impl Into<String>, environment: &str) -> Self {
        Error::NotFound {
            kind,
            key: key.into(),
            environment: environment.to_string(),
        }
    }

    /// Whether this error means the looked-up entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether a request failing with this error is worth repeating
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Result type alias for envsync operations
pub type Result<T> = std::result::Result<T, Error>;

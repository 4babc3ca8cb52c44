//! Contacts-specific error types.

use gws_auth::AuthError;
use gws_core::{ExitCode, NetworkError, Retryable};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContactsError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("{0}")]
    Validation(String),

    #[error("Contact cache is corrupt: {0}")]
    CacheCorruption(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("People API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl ContactsError {
    /// The command that gets the user out of this state, if any.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Auth(e) => e.remediation(),
            Self::CacheCorruption(_) => Some("run `gcontacts clear`, then `gcontacts sync --full`"),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Auth(e) => e.exit_code(),
            Self::Network(_) => ExitCode::Network,
            Self::Validation(_) => ExitCode::Validation,
            Self::CacheCorruption(_) => ExitCode::CacheCorruption,
            Self::Cache(_) | Self::Api { .. } => ExitCode::Failure,
        }
    }
}

impl Retryable for ContactsError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Auth(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for ContactsError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(failure.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) =>
            {
                Self::CacheCorruption(error.to_string())
            }
            // Rows that no longer decode into the schema we wrote.
            rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => {
                Self::CacheCorruption(error.to_string())
            }
            _ => Self::Cache(error.to_string()),
        }
    }
}

impl From<std::io::Error> for ContactsError {
    fn from(error: std::io::Error) -> Self {
        Self::Cache(error.to_string())
    }
}

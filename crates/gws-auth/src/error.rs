//! Authentication error types.

use gws_core::{ExitCode, NetworkError, Retryable};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No credentials found: run the authorization flow first")]
    NotAuthenticated,

    #[error("Stored credentials have no refresh token")]
    MissingRefreshToken,

    #[error("Refresh token rejected: {reason}")]
    RefreshRejected { reason: String },

    #[error("Authorization code rejected: {reason}")]
    CodeRejected { reason: String },

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Authorization response state does not match the request")]
    StateMismatch,

    #[error("Access token rejected by API ({status}): {message}")]
    AccessDenied { status: u16, message: String },

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

impl AuthError {
    /// The command that gets the user out of this state, if any.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::NotAuthenticated | Self::MissingRefreshToken | Self::RefreshRejected { .. } => {
                Some("run `gauth login` to authorize")
            }
            Self::CodeRejected { .. } | Self::AuthorizationDenied(_) | Self::StateMismatch => {
                Some("run `gauth login` again and paste the new code")
            }
            Self::AccessDenied { .. } => {
                Some("run `gauth refresh`, or `gauth login` if the scopes have changed")
            }
            Self::Storage(_) => Some("remove the credentials file and run `gauth login`"),
            Self::InvalidResponse(_) | Self::Network(_) => None,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Network(_) => ExitCode::Network,
            _ => ExitCode::Authentication,
        }
    }
}

impl Retryable for AuthError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remediation_names_login() {
        assert!(AuthError::NotAuthenticated
            .remediation()
            .is_some_and(|hint| hint.contains("gauth login")));
        assert!(AuthError::RefreshRejected { reason: "invalid_grant".into() }
            .remediation()
            .is_some_and(|hint| hint.contains("gauth login")));
        assert!(AuthError::Network(NetworkError::Timeout).remediation().is_none());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AuthError::NotAuthenticated.exit_code(), ExitCode::Authentication);
        assert_eq!(AuthError::Network(NetworkError::Timeout).exit_code(), ExitCode::Network);
    }

    #[test]
    fn test_is_retryable() {
        assert!(AuthError::Network(NetworkError::Timeout).is_retryable());
        assert!(!AuthError::RefreshRejected { reason: "invalid_grant".into() }.is_retryable());
        assert!(!AuthError::NotAuthenticated.is_retryable());
    }
}

//! Shared error types and process exit codes.
//!
//! Component crates define their own error enums (`AuthError`,
//! `ContactsError`) and embed [`NetworkError`] for transport failures so that
//! "try again later" stays distinguishable from "must re-authorize".

use thiserror::Error;

use crate::retry::Retryable;

/// Process exit codes shared by every gws executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    Validation = 2,
    Authentication = 3,
    Network = 4,
    CacheCorruption = 5,
    Config = 6,
}

impl ExitCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    /// Remediation shown next to the error on the command line.
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => "check your network connection and try again",
            NetworkError::Timeout => {
                "try again, or raise network.timeout_secs in config.toml"
            }
            NetworkError::ServerError { .. } if self.is_retryable() => {
                "the service is unavailable; try again later"
            }
            NetworkError::ServerError { .. } => "the service refused the request; run with -vv for details",
            NetworkError::InvalidResponse(_) => {
                "the service sent an unexpected response; run with -vv for details"
            }
        }
    }
}

impl Retryable for NetworkError {
    fn is_retryable(&self) -> bool {
        match self {
            NetworkError::ConnectionFailed(_) | NetworkError::Timeout => true,
            NetworkError::ServerError { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            NetworkError::InvalidResponse(_) => false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    /// Remediation shown next to the error on the command line.
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "check the directory passed with --config or GWS_CONFIG_DIR",
            ConfigError::Invalid(_) | ConfigError::ParseError(_) => "fix config.toml and try again",
            ConfigError::MissingSetting(_) => {
                "set google.client_id and google.client_secret in config.toml, or GWS_CLIENT_ID and GWS_CLIENT_SECRET"
            }
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_connect() {
            NetworkError::ConnectionFailed(self.to_string())
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            ExitCode::Success,
            ExitCode::Failure,
            ExitCode::Validation,
            ExitCode::Authentication,
            ExitCode::Network,
            ExitCode::CacheCorruption,
            ExitCode::Config,
        ];
        let mut seen: Vec<u8> = codes.iter().map(|c| c.code()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), codes.len());
        assert_eq!(ExitCode::Authentication.code(), 3);
    }

    #[test]
    fn test_network_error_retryable() {
        assert!(NetworkError::Timeout.is_retryable());
        assert!(NetworkError::ConnectionFailed("reset".into()).is_retryable());
        assert!(NetworkError::ServerError { status: 503, message: String::new() }.is_retryable());
        assert!(NetworkError::ServerError { status: 429, message: String::new() }.is_retryable());
        assert!(!NetworkError::ServerError { status: 400, message: String::new() }.is_retryable());
        assert!(!NetworkError::InvalidResponse("bad json".into()).is_retryable());
    }

    #[test]
    fn test_user_messages() {
        assert!(NetworkError::Timeout.user_message().contains("timeout_secs"));
        assert!(NetworkError::ServerError { status: 503, message: String::new() }
            .user_message()
            .contains("later"));
        assert!(!NetworkError::ServerError { status: 400, message: String::new() }
            .user_message()
            .contains("later"));
        assert!(ConfigError::MissingSetting("google.client_id".into())
            .user_message()
            .contains("GWS_CLIENT_ID"));
        assert!(ConfigError::ParseError("bad".into()).user_message().contains("config.toml"));
    }
}

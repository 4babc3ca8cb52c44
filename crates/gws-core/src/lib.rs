//! Shared infrastructure for the gws executables: configuration, the error
//! taxonomy and exit codes, retry policy, and logging setup.

pub mod config;
pub mod error;
pub mod retry;

pub use config::{
    Config, ContactsConfig, GoogleConfig, NetworkConfig, OutputConfig, Profile,
    ValidationResult,
};
pub use error::{ConfigError, ExitCode, NetworkError, ReqwestErrorExt};
pub use retry::{with_retry, RetryConfig, Retryable};

use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Build the HTTP client shared by every network-calling component.
///
/// Every request is bounded by `timeout`; a timeout surfaces as
/// [`NetworkError::Timeout`].
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, NetworkError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(concat!("gws/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| e.into_network_error())
}

/// Initialize tracing for a CLI invocation.
///
/// Logs go to stderr so that stdout stays clean for TSV/JSON consumers.
/// `RUST_LOG` takes precedence over the verbosity flag.
pub fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (e.g. in tests) is harmless; ignore the error.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

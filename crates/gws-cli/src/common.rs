//! Shared command plumbing: context loading, component construction, and
//! the error-to-exit-code boundary.

use std::io::Write;
use std::path::PathBuf;

use gws_auth::{AuthError, CredentialManager, FileCredentialStore, GoogleOAuth2Provider};
use gws_contacts::ContactsError;
use gws_core::{Config, ConfigError, ExitCode, NetworkError, Profile};
use thiserror::Error;

use crate::cli::GlobalArgs;
use crate::output::OutputFormat;

/// Errors surfaced by a command, each mapped to a process exit code.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Contacts(#[from] ContactsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(anyhow::Error),
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Auth(e) => e.exit_code(),
            Self::Contacts(e) => e.exit_code(),
            Self::Config(_) => ExitCode::Config,
            Self::Network(_) => ExitCode::Network,
            Self::Io(_) | Self::Other(_) => ExitCode::Failure,
        }
    }

    pub fn remediation(&self) -> Option<&'static str> {
        let hint = match self {
            Self::Auth(e) => e.remediation(),
            Self::Contacts(e) => e.remediation(),
            Self::Config(e) => Some(e.user_message()),
            Self::Io(_) | Self::Other(_) | Self::Network(_) => None,
        };
        hint.or_else(|| self.network_error().map(NetworkError::user_message))
    }

    /// The transport failure behind this error, however deeply wrapped.
    fn network_error(&self) -> Option<&NetworkError> {
        match self {
            Self::Network(e)
            | Self::Auth(AuthError::Network(e))
            | Self::Contacts(ContactsError::Network(e))
            | Self::Contacts(ContactsError::Auth(AuthError::Network(e))) => Some(e),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ConfigError>() {
            Ok(config) => Self::Config(config),
            Err(other) => Self::Other(other),
        }
    }
}

/// Print `error:` and optional `hint:` lines and return the exit code.
pub fn report(error: &CliError, err: &mut impl Write) -> ExitCode {
    let _ = writeln!(err, "error: {}", error);
    if let Some(hint) = error.remediation() {
        let _ = writeln!(err, "hint: {}", hint);
    }
    error.exit_code()
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    pub profile: Profile,
    pub format: OutputFormat,
}

impl Context {
    pub fn load(global: &GlobalArgs) -> Result<Self, CliError> {
        let profile = Profile::new(&global.profile)?;
        let config = Config::load_validated(global.config_dir.as_deref())?;
        Self::from_config(config, profile, global.format)
    }

    pub fn from_config(
        config: Config,
        profile: Profile,
        format: Option<OutputFormat>,
    ) -> Result<Self, CliError> {
        let format = match format {
            Some(format) => format,
            None => config
                .output
                .format
                .parse()
                .map_err(|e: String| ConfigError::Invalid(e))?,
        };

        tracing::debug!(
            "Using profile '{}' with config dir {}",
            profile,
            config.config_dir.display()
        );
        Ok(Self {
            config,
            profile,
            format,
        })
    }

    pub fn credential_store(&self) -> FileCredentialStore {
        FileCredentialStore::new(self.config.credentials_path(&self.profile))
    }

    pub fn contacts_cache_path(&self) -> PathBuf {
        self.config.contacts_cache_path(&self.profile)
    }

    pub fn http_client(&self) -> Result<reqwest::Client, CliError> {
        Ok(gws_core::http_client(self.config.network.timeout())?)
    }

    /// Credential Manager over the profile's credential file and the
    /// configured Google OAuth client.
    pub fn credential_manager(
        &self,
    ) -> Result<CredentialManager<FileCredentialStore, GoogleOAuth2Provider>, CliError> {
        let provider = GoogleOAuth2Provider::from_config(&self.config.google, self.http_client()?)?;
        Ok(CredentialManager::new(self.credential_store(), provider)
            .with_retry(self.config.network.retry()))
    }
}

/// Human-readable age such as `3d 4h` or `12m`.
pub fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", secs)
    }
}

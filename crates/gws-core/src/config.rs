use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::retry::RetryConfig;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "gws";

pub const DEFAULT_PROFILE: &str = "default";

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const PEOPLE_API_URL: &str = "https://people.googleapis.com";

/// Scopes covering every gws surface.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/contacts.readonly",
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/presentations",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a single-line summary of all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml, credentials and caches. Not serialized.
    #[serde(skip)]
    pub config_dir: PathBuf,

    #[serde(default)]
    pub google: GoogleConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub contacts: ContactsConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// OAuth client and API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client ID from the Google Cloud console
    pub client_id: Option<String>,
    /// OAuth client secret
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_people_api_url")]
    pub people_api_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/callback".to_string()
}

fn default_auth_url() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

fn default_people_api_url() -> String {
    PEOPLE_API_URL.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            people_api_url: default_people_api_url(),
            scopes: default_scopes(),
        }
    }
}

impl GoogleConfig {
    /// Check if credentials are configured (not placeholders)
    pub fn is_configured(&self) -> bool {
        let usable = |v: &Option<String>| {
            v.as_deref()
                .map(|s| !s.is_empty() && !s.starts_with("YOUR_"))
                .unwrap_or(false)
        };
        usable(&self.client_id) && usable(&self.client_secret)
    }

    /// Returns (client_id, client_secret), or the missing setting.
    pub fn client_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let client_id = self
            .client_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingSetting("google.client_id".to_string()))?;
        let client_secret = self
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingSetting("google.client_secret".to_string()))?;
        Ok((client_id, client_secret))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for force-refresh and sync page fetches
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    crate::retry::DEFAULT_MAX_RETRIES
}

fn default_initial_delay_ms() -> u64 {
    crate::retry::DEFAULT_INITIAL_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    crate::retry::DEFAULT_MAX_DELAY_MS
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, self.initial_delay_ms, self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactsConfig {
    /// Sync cursors older than this force a full resync
    #[serde(default = "default_cursor_retention_days")]
    pub cursor_retention_days: u32,
    /// Result cap for search/list when --limit is not given
    #[serde(default = "default_limit")]
    pub default_limit: u32,
}

fn default_cursor_retention_days() -> u32 {
    7
}

fn default_limit() -> u32 {
    20
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            cursor_retention_days: default_cursor_retention_days(),
            default_limit: default_limit(),
        }
    }
}

impl ContactsConfig {
    pub fn cursor_retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.cursor_retention_days) * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// "tsv", "json" or "text"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

/// A named set of credentials and cache (`--profile`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile(String);

impl Profile {
    pub fn new(name: &str) -> Result<Self, ConfigError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ConfigError::Invalid(format!(
                "profile name '{}' may only contain letters, digits, '-' and '_'",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self(DEFAULT_PROFILE.to_string())
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            google: GoogleConfig::default(),
            network: NetworkConfig::default(),
            contacts: ContactsConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

impl Config {
    /// Resolve the config directory: explicit path, then `GWS_CONFIG_DIR`,
    /// then the platform config directory.
    pub fn resolve_dir(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("GWS_CONFIG_DIR").map(PathBuf::from))
            .unwrap_or_else(default_config_dir)
    }

    /// Load configuration from `<dir>/config.toml`, falling back to defaults
    /// when the file does not exist. Environment overrides are applied last.
    pub fn load(explicit_dir: Option<&Path>) -> Result<Self> {
        let config_dir = Self::resolve_dir(explicit_dir);
        let mut config = Self::load_from_dir(&config_dir)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a directory without consulting the environment.
    pub fn load_from_dir(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            toml::from_str::<Config>(&contents).map_err(|e| {
                ConfigError::ParseError(format!("{}: {}", config_path.display(), e))
            })?
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Config::default()
        };

        config.config_dir = config_dir.to_path_buf();
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; errors fail the load.
    pub fn load_validated(explicit_dir: Option<&Path>) -> Result<Self> {
        let config = Self::load(explicit_dir)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(config)
    }

    /// Apply `GWS_CLIENT_ID` / `GWS_CLIENT_SECRET` overrides.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("GWS_CLIENT_ID").filter(|v| !v.is_empty()) {
            self.google.client_id = Some(id);
        }
        if let Some(secret) = lookup("GWS_CLIENT_SECRET").filter(|v| !v.is_empty()) {
            self.google.client_secret = Some(secret);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_url(&self.google.auth_url, "google.auth_url", &mut result);
        Self::validate_url(&self.google.token_url, "google.token_url", &mut result);
        Self::validate_url(&self.google.people_api_url, "google.people_api_url", &mut result);
        Self::validate_url(&self.google.redirect_uri, "google.redirect_uri", &mut result);

        if self.google.scopes.is_empty() {
            result.add_error("google.scopes", "At least one scope is required");
        }

        if self.network.timeout_secs == 0 {
            result.add_error("network.timeout_secs", "Timeout must be greater than 0");
        } else if self.network.timeout_secs > 600 {
            result.add_warning("network.timeout_secs", "Timeout is unusually large (>600s)");
        }

        if self.network.max_retries > 10 {
            result.add_warning("network.max_retries", "More than 10 retries configured");
        }

        if self.contacts.cursor_retention_days == 0 {
            result.add_error(
                "contacts.cursor_retention_days",
                "Retention must be at least 1 day",
            );
        }

        if self.contacts.default_limit == 0 {
            result.add_error("contacts.default_limit", "Default limit must be greater than 0");
        }

        if !matches!(self.output.format.as_str(), "tsv" | "json" | "text") {
            result.add_error(
                "output.format",
                format!("Unknown format '{}', expected tsv, json or text", self.output.format),
            );
        }

        if !self.google.is_configured() {
            result.add_warning(
                "google",
                "OAuth client not configured - set google.client_id/client_secret or GWS_CLIENT_ID/GWS_CLIENT_SECRET",
            );
        }

        result
    }

    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }
                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Credential Record file for a profile.
    pub fn credentials_path(&self, profile: &Profile) -> PathBuf {
        self.config_dir
            .join("credentials")
            .join(format!("{}.json", profile.name()))
    }

    /// Contact cache database for a profile.
    pub fn contacts_cache_path(&self, profile: &Profile) -> PathBuf {
        self.config_dir
            .join("cache")
            .join(profile.name())
            .join("contacts.db")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_unconfigured_client_is_warning() {
        let result = Config::default().validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "google"));
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.google.token_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "google.token_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.google.people_api_url = "ftp://people.example.com".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = Config::default();
        config.network.timeout_secs = 0;
        config.contacts.cursor_retention_days = 0;
        config.contacts.default_limit = 0;
        let result = config.validate();
        assert_eq!(result.errors.len(), 3);
        assert!(result.error_summary().contains("network.timeout_secs"));
    }

    #[test]
    fn test_unknown_output_format() {
        let mut config = Config::default();
        config.output.format = "yaml".to_string();
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.config_dir, dir.path());
        assert_eq!(config.network.timeout_secs, 30);
        assert_eq!(config.google.token_url, GOOGLE_TOKEN_URL);
        assert!(!dir.path().join("config.toml").exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
[google]
client_id = "id.apps.googleusercontent.com"
client_secret = "shh"

[contacts]
default_limit = 5
"#,
        )
        .unwrap();

        let config = Config::load_from_dir(dir.path()).unwrap();
        assert!(config.google.is_configured());
        assert_eq!(config.contacts.default_limit, 5);
        assert_eq!(config.contacts.cursor_retention_days, 7);
        assert_eq!(config.output.format, "text");
        assert_eq!(config.google.scopes.len(), DEFAULT_SCOPES.len());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[google\nclient_id = ").unwrap();

        let err = Config::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            "GWS_CLIENT_ID" => Some("env-id".to_string()),
            "GWS_CLIENT_SECRET" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.google.client_id.as_deref(), Some("env-id"));
        assert!(config.google.client_secret.is_none());
        assert!(matches!(
            config.google.client_credentials(),
            Err(ConfigError::MissingSetting(field)) if field == "google.client_secret"
        ));
    }

    #[test]
    fn test_profile_names() {
        assert!(Profile::new("work").is_ok());
        assert!(Profile::new("team_2-a").is_ok());
        assert!(Profile::new("").is_err());
        assert!(Profile::new("../etc").is_err());
        assert_eq!(Profile::default().name(), "default");
    }

    #[test]
    fn test_profile_paths() {
        let mut config = Config::default();
        config.config_dir = PathBuf::from("/tmp/gws");
        let profile = Profile::new("work").unwrap();
        assert_eq!(
            config.credentials_path(&profile),
            PathBuf::from("/tmp/gws/credentials/work.json")
        );
        assert_eq!(
            config.contacts_cache_path(&profile),
            PathBuf::from("/tmp/gws/cache/work/contacts.db")
        );
    }

    #[test]
    fn test_network_retry_policy() {
        let network = NetworkConfig {
            timeout_secs: 10,
            max_retries: 4,
            initial_delay_ms: 50,
            max_delay_ms: 400,
        };
        assert_eq!(network.timeout(), Duration::from_secs(10));
        assert_eq!(network.retry(), RetryConfig::new(4, 50, 400));
    }
}

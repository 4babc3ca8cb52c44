use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::oauth::TokenGrant;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Persisted OAuth2 credentials for one profile.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Bearer token for API requests
    pub access_token: String,

    /// Long-lived token used to obtain new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Absolute expiry of `access_token`
    pub expiry: DateTime<Utc>,

    /// Scopes granted to this token
    #[serde(default)]
    pub granted_scopes: Vec<String>,
}

/// Observable state of the stored credentials.
///
/// There is no revoked state. A rejected refresh leaves the record as it was,
/// so it keeps reading as `Expired` until `gauth login` replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Absent,
    Valid,
    Expired,
}

impl CredentialState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Valid => "valid",
            Self::Expired => "expired",
        }
    }
}

impl CredentialRecord {
    /// True if the access token may still be used at `now`, keeping `margin`
    /// in hand for request latency.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expiry
    }

    pub fn state_at(&self, now: DateTime<Utc>, margin: Duration) -> CredentialState {
        if self.is_valid_at(now, margin) {
            CredentialState::Valid
        } else {
            CredentialState::Expired
        }
    }

    /// Build a record from a token grant. Fields the endpoint omitted
    /// (refresh token, scope) are carried over from `previous`.
    pub fn from_grant(
        grant: TokenGrant,
        now: DateTime<Utc>,
        previous: Option<&CredentialRecord>,
    ) -> Self {
        let expires_in = grant
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        let granted_scopes = match grant.scope.as_deref() {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(str::to_string).collect()
            }
            _ => previous
                .map(|p| p.granted_scopes.clone())
                .unwrap_or_default(),
        };

        Self {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            expiry: now + Duration::seconds(expires_in),
            granted_scopes,
        }
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expiry", &self.expiry)
            .field("granted_scopes", &self.granted_scopes)
            .finish()
    }
}

/// Read-only bearer token handed to command surfaces.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([redacted])")
    }
}

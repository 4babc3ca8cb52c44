use chrono::{Duration, Utc};
use gws_core::{with_retry, RetryConfig};
use tracing::instrument;

use crate::credential::{AccessToken, CredentialRecord, CredentialState};
use crate::error::AuthError;
use crate::oauth::{TokenEndpoint, TokenExchange};
use crate::storage::CredentialStore;

/// Tokens this close to expiry are treated as expired.
pub const DEFAULT_EXPIRY_MARGIN_SECS: i64 = 60;

/// Produces a valid bearer token for every outgoing API call.
///
/// Storage and the token endpoint are injected so the lifecycle can be
/// exercised against in-memory stores and mock endpoints.
pub struct CredentialManager<S, E> {
    store: S,
    endpoint: E,
    retry: RetryConfig,
    expiry_margin: Duration,
}

impl<S: CredentialStore, E: TokenEndpoint> CredentialManager<S, E> {
    pub fn new(store: S, endpoint: E) -> Self {
        Self {
            store,
            endpoint,
            retry: RetryConfig::none(),
            expiry_margin: Duration::seconds(DEFAULT_EXPIRY_MARGIN_SECS),
        }
    }

    /// Retry policy for [`force_refresh`](Self::force_refresh).
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Read-only view of the stored record.
    pub fn record(&self) -> Result<Option<CredentialRecord>, AuthError> {
        self.store.load()
    }

    pub fn state(&self) -> Result<CredentialState, AuthError> {
        Ok(match self.store.load()? {
            None => CredentialState::Absent,
            Some(record) => record.state_at(Utc::now(), self.expiry_margin),
        })
    }

    /// Exchange an authorization code and persist the resulting record.
    /// Only ever called on explicit user request.
    #[instrument(skip_all, level = "info")]
    pub async fn authorize(&self, code: &str) -> Result<AccessToken, AuthError> {
        match self.endpoint.exchange_code(code).await? {
            TokenExchange::Granted(grant) => {
                let record = CredentialRecord::from_grant(grant, Utc::now(), None);
                if record.refresh_token.is_none() {
                    tracing::warn!("Authorization returned no refresh token; the session cannot be refreshed");
                }
                self.store.save(&record)?;
                tracing::info!("Authorization completed, token valid until {}", record.expiry);
                Ok(AccessToken::new(record.access_token))
            }
            TokenExchange::Rejected(body) => Err(AuthError::CodeRejected {
                reason: body.to_string(),
            }),
        }
    }

    /// Return the stored access token, refreshing it once if it has expired.
    #[instrument(skip_all, level = "debug")]
    pub async fn get_valid_token(&self) -> Result<AccessToken, AuthError> {
        let record = self.store.load()?.ok_or(AuthError::NotAuthenticated)?;

        if record.is_valid_at(Utc::now(), self.expiry_margin) {
            tracing::debug!("Using stored access token, valid until {}", record.expiry);
            return Ok(AccessToken::new(record.access_token));
        }

        tracing::info!("Access token expired at {}, refreshing", record.expiry);
        self.refresh_record(record, &RetryConfig::none()).await
    }

    /// Refresh regardless of expiry, retrying transient failures per the
    /// configured policy.
    #[instrument(skip_all, level = "info")]
    pub async fn force_refresh(&self) -> Result<AccessToken, AuthError> {
        let record = self.store.load()?.ok_or(AuthError::NotAuthenticated)?;
        self.refresh_record(record, &self.retry).await
    }

    /// Delete the stored record. Returns whether one existed.
    pub fn sign_out(&self) -> Result<bool, AuthError> {
        self.store.delete()
    }

    async fn refresh_record(
        &self,
        record: CredentialRecord,
        retry: &RetryConfig,
    ) -> Result<AccessToken, AuthError> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .ok_or(AuthError::MissingRefreshToken)?;

        match with_retry(retry, || self.endpoint.refresh(refresh_token)).await? {
            TokenExchange::Granted(grant) => {
                let updated = CredentialRecord::from_grant(grant, Utc::now(), Some(&record));
                self.store.save(&updated)?;
                tracing::info!("Access token refreshed, valid until {}", updated.expiry);
                Ok(AccessToken::new(updated.access_token))
            }
            TokenExchange::Rejected(body) => {
                // The stored record is kept; only `gauth login` replaces it.
                tracing::warn!("Refresh token rejected: {}", body);
                Err(AuthError::RefreshRejected {
                    reason: body.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::oauth::{OAuthErrorBody, TokenGrant};
    use crate::storage::MemoryCredentialStore;
    use gws_core::NetworkError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Endpoint that replays scripted refresh outcomes and counts calls.
    #[derive(Default)]
    struct ScriptedEndpoint {
        outcomes: Mutex<VecDeque<Result<TokenExchange, AuthError>>>,
        refresh_calls: Mutex<u32>,
    }

    impl ScriptedEndpoint {
        fn with(outcomes: Vec<Result<TokenExchange, AuthError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                refresh_calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.refresh_calls.lock()
        }
    }

    impl TokenEndpoint for ScriptedEndpoint {
        fn authorization_url(&self, state: &str) -> String {
            format!("https://auth.example.com/?state={}", state)
        }

        async fn exchange_code(&self, _code: &str) -> Result<TokenExchange, AuthError> {
            Ok(granted("from-code", Some("refresh-1")))
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenExchange, AuthError> {
            *self.refresh_calls.lock() += 1;
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(AuthError::Network(NetworkError::Timeout)))
        }
    }

    fn granted(access: &str, refresh: Option<&str>) -> TokenExchange {
        TokenExchange::Granted(TokenGrant {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(3600),
            scope: None,
            token_type: Some("Bearer".to_string()),
        })
    }

    fn rejected() -> TokenExchange {
        TokenExchange::Rejected(OAuthErrorBody {
            error: "invalid_grant".to_string(),
            error_description: None,
        })
    }

    fn record(expiry_offset: Duration) -> CredentialRecord {
        CredentialRecord {
            access_token: "stored".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expiry: Utc::now() + expiry_offset,
            granted_scopes: vec![],
        }
    }

    #[tokio::test]
    async fn test_absent_credentials() {
        let manager = CredentialManager::new(MemoryCredentialStore::new(), ScriptedEndpoint::default());

        assert_eq!(manager.state().unwrap(), CredentialState::Absent);
        assert!(matches!(
            manager.get_valid_token().await,
            Err(AuthError::NotAuthenticated)
        ));
        assert_eq!(manager.endpoint().calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_needs_no_refresh() {
        let manager = CredentialManager::new(
            MemoryCredentialStore::with_record(record(Duration::hours(1))),
            ScriptedEndpoint::default(),
        );

        let token = manager.get_valid_token().await.unwrap();
        assert_eq!(token.secret(), "stored");
        assert_eq!(manager.endpoint().calls(), 0);
        assert_eq!(manager.store().save_count(), 0);
    }

    #[tokio::test]
    async fn test_expiry_margin_triggers_refresh() {
        let manager = CredentialManager::new(
            MemoryCredentialStore::with_record(record(Duration::seconds(30))),
            ScriptedEndpoint::with(vec![Ok(granted("fresh", None))]),
        );

        let token = manager.get_valid_token().await.unwrap();
        assert_eq!(token.secret(), "fresh");
        assert_eq!(manager.endpoint().calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_persisted() {
        let manager = CredentialManager::new(
            MemoryCredentialStore::with_record(record(-Duration::hours(1))),
            ScriptedEndpoint::with(vec![Ok(granted("fresh", None))]),
        );

        let token = manager.get_valid_token().await.unwrap();
        assert_eq!(token.secret(), "fresh");

        let stored = manager.record().unwrap().unwrap();
        assert_eq!(stored.access_token, "fresh");
        assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
        assert!(stored.expiry > Utc::now());
        assert_eq!(manager.state().unwrap(), CredentialState::Valid);
    }

    #[tokio::test]
    async fn test_get_valid_token_never_retries() {
        let manager = CredentialManager::new(
            MemoryCredentialStore::with_record(record(-Duration::hours(1))),
            ScriptedEndpoint::with(vec![
                Err(AuthError::Network(NetworkError::Timeout)),
                Ok(granted("fresh", None)),
            ]),
        )
        .with_retry(RetryConfig::new(3, 0, 0));

        let result = manager.get_valid_token().await;
        assert!(matches!(result, Err(AuthError::Network(NetworkError::Timeout))));
        assert_eq!(manager.endpoint().calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_refresh_keeps_record() {
        let original = record(-Duration::hours(1));
        let manager = CredentialManager::new(
            MemoryCredentialStore::with_record(original.clone()),
            ScriptedEndpoint::with(vec![Ok(rejected())]),
        );

        let result = manager.get_valid_token().await;
        assert!(matches!(result, Err(AuthError::RefreshRejected { .. })));
        assert_eq!(manager.record().unwrap(), Some(original));
        assert_eq!(manager.store().save_count(), 0);
        assert_eq!(manager.state().unwrap(), CredentialState::Expired);
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let mut rec = record(-Duration::hours(1));
        rec.refresh_token = None;
        let manager = CredentialManager::new(
            MemoryCredentialStore::with_record(rec),
            ScriptedEndpoint::default(),
        );

        assert!(matches!(
            manager.get_valid_token().await,
            Err(AuthError::MissingRefreshToken)
        ));
        assert_eq!(manager.endpoint().calls(), 0);
    }

    #[tokio::test]
    async fn test_force_refresh_ignores_expiry() {
        let manager = CredentialManager::new(
            MemoryCredentialStore::with_record(record(Duration::hours(1))),
            ScriptedEndpoint::with(vec![Ok(granted("forced", None))]),
        );

        let token = manager.force_refresh().await.unwrap();
        assert_eq!(token.secret(), "forced");
        assert_eq!(manager.endpoint().calls(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_retries_network_errors() {
        let manager = CredentialManager::new(
            MemoryCredentialStore::with_record(record(Duration::hours(1))),
            ScriptedEndpoint::with(vec![
                Err(AuthError::Network(NetworkError::ConnectionFailed("reset".into()))),
                Err(AuthError::Network(NetworkError::Timeout)),
                Ok(granted("third-time", None)),
            ]),
        )
        .with_retry(RetryConfig::new(2, 0, 0));

        let token = manager.force_refresh().await.unwrap();
        assert_eq!(token.secret(), "third-time");
        assert_eq!(manager.endpoint().calls(), 3);
    }

    #[tokio::test]
    async fn test_force_refresh_does_not_retry_rejection() {
        let manager = CredentialManager::new(
            MemoryCredentialStore::with_record(record(Duration::hours(1))),
            ScriptedEndpoint::with(vec![Ok(rejected()), Ok(granted("never", None))]),
        )
        .with_retry(RetryConfig::new(5, 0, 0));

        assert!(matches!(
            manager.force_refresh().await,
            Err(AuthError::RefreshRejected { .. })
        ));
        assert_eq!(manager.endpoint().calls(), 1);
    }

    #[tokio::test]
    async fn test_authorize_then_sign_out() {
        let manager = CredentialManager::new(MemoryCredentialStore::new(), ScriptedEndpoint::default());

        let token = manager.authorize("code").await.unwrap();
        assert_eq!(token.secret(), "from-code");
        assert_eq!(manager.state().unwrap(), CredentialState::Valid);

        assert!(manager.sign_out().unwrap());
        assert_eq!(manager.state().unwrap(), CredentialState::Absent);
        assert!(!manager.sign_out().unwrap());
    }
}

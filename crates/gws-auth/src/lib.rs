//! Credential Manager for the gws executables.
//!
//! Owns the OAuth2 token lifecycle: loading the persisted Credential Record,
//! checking expiry, refreshing through Google's token endpoint and persisting
//! the result. Commands only ever see an [`AccessToken`].

pub mod credential;
pub mod error;
pub mod google;
pub mod manager;
pub mod oauth;
pub mod storage;

pub use credential::{AccessToken, CredentialRecord, CredentialState};
pub use error::AuthError;
pub use google::GoogleOAuth2Provider;
pub use manager::CredentialManager;
pub use oauth::{
    parse_authorization_response, AuthorizationRequest, OAuthErrorBody, TokenEndpoint,
    TokenExchange, TokenGrant,
};
pub use storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

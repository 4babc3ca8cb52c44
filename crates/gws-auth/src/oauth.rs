use serde::Deserialize;
use url::Url;

use crate::error::AuthError;

/// Successful response from an OAuth2 token endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// RFC 6749 §5.2 error body (`invalid_grant`, `invalid_client`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl std::fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => f.write_str(&self.error),
        }
    }
}

/// Outcome of a token request that reached the endpoint.
///
/// Transport failures are `Err(AuthError::Network)`; an explicit refusal by
/// the endpoint is `Rejected` so callers can tell "try later" from
/// "re-authorize".
#[derive(Debug, Clone)]
pub enum TokenExchange {
    Granted(TokenGrant),
    Rejected(OAuthErrorBody),
}

/// Token endpoint used by the Credential Manager.
#[allow(async_fn_in_trait)]
pub trait TokenEndpoint {
    /// Consent URL the user opens to start the authorization-code flow.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenExchange, AuthError>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenExchange, AuthError>;
}

/// A pending authorization: the URL to visit and the state to expect back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

impl AuthorizationRequest {
    pub fn new<E: TokenEndpoint>(endpoint: &E) -> Self {
        let state = uuid::Uuid::new_v4().to_string();
        Self {
            url: endpoint.authorization_url(&state),
            state,
        }
    }
}

/// Extract the authorization code from what the user pasted back.
///
/// Accepts a bare code, a query string (`code=...&state=...`), or the full
/// redirect URL. When a state is present it must match `expected_state`.
pub fn parse_authorization_response(input: &str, expected_state: &str) -> Result<String, AuthError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AuthError::CodeRejected {
            reason: "no authorization code provided".to_string(),
        });
    }

    let query = match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url.query().unwrap_or("").to_string(),
        _ if input.contains("code=") || input.contains("error=") => {
            input.trim_start_matches('?').to_string()
        }
        _ => return Ok(input.to_string()),
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "error" => return Err(AuthError::AuthorizationDenied(value.into_owned())),
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }

    code.filter(|c| !c.is_empty()).ok_or_else(|| AuthError::CodeRejected {
        reason: "redirect URL carries no code parameter".to_string(),
    })
}

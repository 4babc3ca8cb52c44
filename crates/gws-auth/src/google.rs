//! Google OAuth2 provider for all Workspace surfaces.

use gws_core::{retry::is_retryable_status, ConfigError, GoogleConfig, NetworkError, ReqwestErrorExt};
use tracing::instrument;

use crate::error::AuthError;
use crate::oauth::{OAuthErrorBody, TokenEndpoint, TokenExchange, TokenGrant};

pub struct GoogleOAuth2Provider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    redirect_uri: String,
    scopes: Vec<String>,
}

impl GoogleOAuth2Provider {
    /// Build a provider from the `[google]` config section.
    pub fn from_config(google: &GoogleConfig, client: reqwest::Client) -> Result<Self, ConfigError> {
        let (client_id, client_secret) = google.client_credentials()?;
        Ok(Self {
            client,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth_url: google.auth_url.clone(),
            token_url: google.token_url.clone(),
            redirect_uri: google.redirect_uri.clone(),
            scopes: google.scopes.clone(),
        })
    }

    /// POST a form to the token endpoint and classify the response.
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenExchange, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| e.into_network_error())?;

        let status = response.status();

        if status.is_success() {
            let grant = response
                .json::<TokenGrant>()
                .await
                .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
            return Ok(TokenExchange::Granted(grant));
        }

        let text = response.text().await.unwrap_or_default();

        if is_retryable_status(status) {
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message: text,
            }
            .into());
        }

        let body = serde_json::from_str::<OAuthErrorBody>(&text).unwrap_or_else(|_| OAuthErrorBody {
            error: format!("http_{}", status.as_u16()),
            error_description: Some(text).filter(|t| !t.is_empty()),
        });
        Ok(TokenExchange::Rejected(body))
    }
}

impl TokenEndpoint for GoogleOAuth2Provider {
    fn authorization_url(&self, state: &str) -> String {
        let scopes = self.scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state),
        )
    }

    #[instrument(skip(self, code), level = "info")]
    async fn exchange_code(&self, code: &str) -> Result<TokenExchange, AuthError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    #[instrument(skip(self, refresh_token), level = "info")]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenExchange, AuthError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }
}

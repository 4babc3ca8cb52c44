//! People API client.

use gws_auth::{AccessToken, AuthError};
use gws_core::{retry::is_retryable_status, NetworkError, ReqwestErrorExt};
use reqwest::StatusCode;
use tracing::instrument;

use crate::error::ContactsError;
use crate::types::{
    ChangeListing, ChangePage, ConnectionsResponse, ContactChange, ContactEntry, ContactPage,
};

const PERSON_FIELDS: &str = "names,emailAddresses,phoneNumbers,organizations,metadata";
const PAGE_SIZE: u32 = 1000;

/// Remote source of contacts, paged.
#[allow(async_fn_in_trait)]
pub trait ContactSource {
    /// One page of the full listing. The last page carries the sync token.
    async fn list_contacts(&self, page_token: Option<&str>) -> Result<ContactPage, ContactsError>;

    /// One page of changes since `cursor`.
    async fn list_changes(
        &self,
        cursor: &str,
        page_token: Option<&str>,
    ) -> Result<ChangeListing, ContactsError>;
}

pub struct PeopleClient {
    client: reqwest::Client,
    access_token: AccessToken,
    base_url: String,
}

impl PeopleClient {
    pub fn new(client: reqwest::Client, base_url: &str, access_token: AccessToken) -> Self {
        Self {
            client,
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn connections_url(&self, sync_token: Option<&str>, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/v1/people/me/connections?personFields={}&pageSize={}&requestSyncToken=true",
            self.base_url,
            urlencoding::encode(PERSON_FIELDS),
            PAGE_SIZE
        );
        if let Some(token) = sync_token {
            url.push_str(&format!("&syncToken={}", urlencoding::encode(token)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        url
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ContactsError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(self.access_token.secret())
            .send()
            .await
            .map_err(|e| e.into_network_error())?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::AccessDenied {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        Ok(response)
    }

    async fn parse(response: reqwest::Response) -> Result<ConnectionsResponse, ContactsError> {
        response
            .json::<ConnectionsResponse>()
            .await
            .map_err(|e| NetworkError::InvalidResponse(format!("JSON parse error: {}", e)).into())
    }
}

impl ContactSource for PeopleClient {
    #[instrument(skip(self), level = "info")]
    async fn list_contacts(&self, page_token: Option<&str>) -> Result<ContactPage, ContactsError> {
        let response = self.get(&self.connections_url(None, page_token)).await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if is_retryable_status(status) {
                return Err(NetworkError::ServerError {
                    status: status.as_u16(),
                    message,
                }
                .into());
            }
            return Err(ContactsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = Self::parse(response).await?;
        Ok(ContactPage {
            entries: body
                .connections
                .iter()
                .filter(|p| !p.metadata.as_ref().is_some_and(|m| m.deleted))
                .map(ContactEntry::from_api)
                .collect(),
            next_page_token: body.next_page_token,
            next_sync_token: body.next_sync_token,
        })
    }

    #[instrument(skip(self, cursor), level = "info")]
    async fn list_changes(
        &self,
        cursor: &str,
        page_token: Option<&str>,
    ) -> Result<ChangeListing, ContactsError> {
        let response = self
            .get(&self.connections_url(Some(cursor), page_token))
            .await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!("Sync token rejected ({}): {}", status, text);
            return Ok(ChangeListing::CursorRejected {
                reason: format!("{}: {}", status, text),
            });
        }

        let body = Self::parse(response).await?;
        Ok(ChangeListing::Page(ChangePage {
            changes: body.connections.iter().map(ContactChange::from_api).collect(),
            next_page_token: body.next_page_token,
            next_sync_token: body.next_sync_token,
        }))
    }
}

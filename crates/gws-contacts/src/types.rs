//! People API types and local contact data structures.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Contact summary as stored in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub resource_id: String,
    pub display_name: String,
    pub primary_email: Option<String>,
    pub primary_phone: Option<String>,
    pub organization: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// One entry of a change listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactChange {
    Upsert(ContactEntry),
    Delete(String),
}

impl ContactChange {
    pub fn resource_id(&self) -> &str {
        match self {
            Self::Upsert(entry) => &entry.resource_id,
            Self::Delete(id) => id,
        }
    }
}

/// People API `people.connections.list` response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsResponse {
    #[serde(default)]
    pub connections: Vec<ApiPerson>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// People API `Person` resource, restricted to the fields we request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPerson {
    pub resource_name: String,
    #[serde(default)]
    pub metadata: Option<PersonMetadata>,
    #[serde(default)]
    pub names: Vec<ApiName>,
    #[serde(default)]
    pub email_addresses: Vec<ApiValue>,
    #[serde(default)]
    pub phone_numbers: Vec<ApiValue>,
    #[serde(default)]
    pub organizations: Vec<ApiOrganization>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonMetadata {
    #[serde(default)]
    pub sources: Vec<ApiSource>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSource {
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FieldMetadata {
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiName {
    pub display_name: Option<String>,
    #[serde(default)]
    pub metadata: FieldMetadata,
}

/// Email address or phone number.
#[derive(Debug, Deserialize)]
pub struct ApiValue {
    pub value: Option<String>,
    #[serde(default)]
    pub metadata: FieldMetadata,
}

#[derive(Debug, Deserialize)]
pub struct ApiOrganization {
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: FieldMetadata,
}

/// Pick the primary-flagged non-empty value, else the first non-empty one.
fn primary_value<'a, T>(
    items: &'a [T],
    value: impl Fn(&'a T) -> Option<&'a String>,
    is_primary: impl Fn(&T) -> bool,
) -> Option<String> {
    let non_empty = |item: &'a T| value(item).map(|v| v.trim()).filter(|v| !v.is_empty());

    items
        .iter()
        .find(|item| is_primary(item) && non_empty(*item).is_some())
        .or_else(|| items.iter().find(|item| non_empty(*item).is_some()))
        .and_then(non_empty)
        .map(str::to_string)
}

impl ContactEntry {
    /// Convert an API person to a cache entry.
    pub fn from_api(person: &ApiPerson) -> Self {
        let primary_email = primary_value(
            &person.email_addresses,
            |v| v.value.as_ref(),
            |v| v.metadata.primary,
        );
        let primary_phone = primary_value(
            &person.phone_numbers,
            |v| v.value.as_ref(),
            |v| v.metadata.primary,
        );
        let organization = primary_value(
            &person.organizations,
            |o| o.name.as_ref(),
            |o| o.metadata.primary,
        );

        let display_name = primary_value(
            &person.names,
            |n| n.display_name.as_ref(),
            |n| n.metadata.primary,
        )
        .or_else(|| primary_email.clone())
        .or_else(|| primary_phone.clone())
        .or_else(|| organization.clone())
        .unwrap_or_else(|| person.resource_name.clone());

        let last_modified = person
            .metadata
            .as_ref()
            .and_then(|m| m.sources.iter().filter_map(|s| s.update_time).max())
            .unwrap_or(DateTime::UNIX_EPOCH);

        Self {
            resource_id: person.resource_name.clone(),
            display_name,
            primary_email,
            primary_phone,
            organization,
            last_modified,
        }
    }
}

impl ContactChange {
    pub fn from_api(person: &ApiPerson) -> Self {
        if person.metadata.as_ref().is_some_and(|m| m.deleted) {
            Self::Delete(person.resource_name.clone())
        } else {
            Self::Upsert(ContactEntry::from_api(person))
        }
    }
}

/// One page of the full contact listing.
#[derive(Debug, Clone, Default)]
pub struct ContactPage {
    pub entries: Vec<ContactEntry>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// One page of the change listing.
#[derive(Debug, Clone, Default)]
pub struct ChangePage {
    pub changes: Vec<ContactChange>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// Result of a change-listing request that reached the API.
#[derive(Debug, Clone)]
pub enum ChangeListing {
    Page(ChangePage),
    /// The cursor is expired or unknown to the remote; a full sync is required.
    CursorRejected { reason: String },
}

/// Remote-issued incremental sync marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncCursor {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl SyncCursor {
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            issued_at,
        }
    }

    /// True once the cursor is older than the remote's retention window.
    pub fn is_stale_at(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        now - self.issued_at > retention
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.issued_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

/// Why a sync ran in full mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FullSyncReason {
    Requested,
    NoCursor,
    CursorExpired,
    CursorRejected,
}

impl FullSyncReason {
    /// Whether an incremental sync was expected but could not be used.
    pub fn is_fallback(self) -> bool {
        matches!(self, Self::CursorExpired | Self::CursorRejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::NoCursor => "no_cursor",
            Self::CursorExpired => "cursor_expired",
            Self::CursorRejected => "cursor_rejected",
        }
    }
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

/// Created/updated/deleted counts of one cache write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
}

impl ChangeCounts {
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Outcome of [`ContactSyncer::sync`](crate::ContactSyncer::sync).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub reason: Option<FullSyncReason>,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub fallback_full: bool,
    pub total: u64,
}

impl SyncReport {
    pub fn full(reason: FullSyncReason, counts: ChangeCounts, total: u64) -> Self {
        Self {
            mode: SyncMode::Full,
            reason: Some(reason),
            created: counts.created,
            updated: counts.updated,
            deleted: counts.deleted,
            fallback_full: reason.is_fallback(),
            total,
        }
    }

    pub fn incremental(counts: ChangeCounts, total: u64) -> Self {
        Self {
            mode: SyncMode::Incremental,
            reason: None,
            created: counts.created,
            updated: counts.updated,
            deleted: counts.deleted,
            fallback_full: false,
            total,
        }
    }
}

/// Snapshot of the cache for `gcontacts status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub entries: u64,
    pub cursor: Option<SyncCursor>,
}

//! Full and incremental synchronization of the contact cache.

use chrono::{Duration, Utc};
use gws_core::{with_retry, RetryConfig};
use tracing::instrument;

use crate::cache::ContactCache;
use crate::client::ContactSource;
use crate::error::ContactsError;
use crate::types::{
    ChangeListing, ContactChange, ContactEntry, FullSyncReason, SyncCursor, SyncReport,
};

/// Google documents a seven-day lifetime for People API sync tokens.
pub const DEFAULT_CURSOR_RETENTION_DAYS: i64 = 7;

/// Drives a [`ContactSource`] into a [`ContactCache`].
///
/// Every page is fetched before anything is written; entries and cursor are
/// then committed in one transaction, so a failed sync leaves the cache as
/// it was.
pub struct ContactSyncer<S> {
    source: S,
    retry: RetryConfig,
    cursor_retention: Duration,
}

impl<S: ContactSource> ContactSyncer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            retry: RetryConfig::none(),
            cursor_retention: Duration::days(DEFAULT_CURSOR_RETENTION_DAYS),
        }
    }

    /// Retry policy applied to each page fetch.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cursor_retention(mut self, retention: std::time::Duration) -> Self {
        self.cursor_retention = Duration::from_std(retention).unwrap_or(Duration::MAX);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    #[instrument(skip(self, cache), level = "info")]
    pub async fn sync(
        &self,
        cache: &mut ContactCache,
        full: bool,
    ) -> Result<SyncReport, ContactsError> {
        let cursor = cache.cursor()?;

        let cursor = match (full, cursor) {
            (true, _) => return self.full_sync(cache, FullSyncReason::Requested).await,
            (false, None) => return self.full_sync(cache, FullSyncReason::NoCursor).await,
            (false, Some(cursor)) if cursor.is_stale_at(Utc::now(), self.cursor_retention) => {
                tracing::info!(
                    "Sync cursor issued at {} is past retention, running full sync",
                    cursor.issued_at
                );
                return self.full_sync(cache, FullSyncReason::CursorExpired).await;
            }
            (false, Some(cursor)) => cursor,
        };

        match self.fetch_changes(&cursor.token).await? {
            Some((changes, next_token)) => {
                let next_cursor = self.next_cursor(next_token);
                let counts = cache.apply_changes(&changes, next_cursor.as_ref())?;
                let report = SyncReport::incremental(counts, cache.count()?);
                tracing::info!(
                    "Incremental sync: {} created, {} updated, {} deleted",
                    report.created,
                    report.updated,
                    report.deleted
                );
                Ok(report)
            }
            None => self.full_sync(cache, FullSyncReason::CursorRejected).await,
        }
    }

    async fn full_sync(
        &self,
        cache: &mut ContactCache,
        reason: FullSyncReason,
    ) -> Result<SyncReport, ContactsError> {
        tracing::info!("Running full sync ({})", reason.as_str());

        let mut entries: Vec<ContactEntry> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut sync_token = None;

        loop {
            let page = with_retry(&self.retry, || {
                self.source.list_contacts(page_token.as_deref())
            })
            .await?;
            entries.extend(page.entries);
            sync_token = page.next_sync_token.or(sync_token);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        let next_cursor = self.next_cursor(sync_token);
        let counts = cache.replace_all(&entries, next_cursor.as_ref())?;
        let report = SyncReport::full(reason, counts, cache.count()?);
        tracing::info!(
            "Full sync: {} created, {} updated, {} deleted, {} total",
            report.created,
            report.updated,
            report.deleted,
            report.total
        );
        Ok(report)
    }

    /// Collect every change page. `None` means the remote rejected the cursor.
    async fn fetch_changes(
        &self,
        cursor: &str,
    ) -> Result<Option<(Vec<ContactChange>, Option<String>)>, ContactsError> {
        let mut changes = Vec::new();
        let mut page_token: Option<String> = None;
        let mut sync_token = None;

        loop {
            let listing = with_retry(&self.retry, || {
                self.source.list_changes(cursor, page_token.as_deref())
            })
            .await?;

            let page = match listing {
                ChangeListing::Page(page) => page,
                ChangeListing::CursorRejected { reason } => {
                    tracing::info!("Sync cursor rejected ({}), running full sync", reason);
                    return Ok(None);
                }
            };

            changes.extend(page.changes);
            sync_token = page.next_sync_token.or(sync_token);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(Some((changes, sync_token)))
    }

    fn next_cursor(&self, token: Option<String>) -> Option<SyncCursor> {
        match token {
            Some(token) => Some(SyncCursor::new(token, Utc::now())),
            None => {
                tracing::warn!("Remote returned no sync token; the next sync will be a full sync");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::{ChangePage, ContactPage};
    use gws_core::NetworkError;
    use parking_lot::Mutex;

    /// Single-page source whose listing fails a fixed number of times.
    struct FlakySource {
        failures_left: Mutex<u32>,
        calls: Mutex<u32>,
    }

    impl ContactSource for FlakySource {
        async fn list_contacts(&self, _page_token: Option<&str>) -> Result<ContactPage, ContactsError> {
            *self.calls.lock() += 1;
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(NetworkError::Timeout.into());
            }
            Ok(ContactPage {
                entries: vec![],
                next_page_token: None,
                next_sync_token: Some("sync-1".to_string()),
            })
        }

        async fn list_changes(
            &self,
            _cursor: &str,
            _page_token: Option<&str>,
        ) -> Result<ChangeListing, ContactsError> {
            Ok(ChangeListing::Page(ChangePage::default()))
        }
    }

    fn flaky(failures: u32) -> FlakySource {
        FlakySource {
            failures_left: Mutex::new(failures),
            calls: Mutex::new(0),
        }
    }

    #[tokio::test]
    async fn test_page_fetch_is_retried() {
        let syncer = ContactSyncer::new(flaky(2)).with_retry(RetryConfig::new(2, 0, 0));
        let mut cache = ContactCache::in_memory().unwrap();

        let report = syncer.sync(&mut cache, false).await.unwrap();

        assert_eq!(report.reason, Some(FullSyncReason::NoCursor));
        assert_eq!(*syncer.source().calls.lock(), 3);
        assert_eq!(cache.cursor().unwrap().unwrap().token, "sync-1");
    }

    #[tokio::test]
    async fn test_retries_exhausted_leave_cache_untouched() {
        let syncer = ContactSyncer::new(flaky(5)).with_retry(RetryConfig::new(1, 0, 0));
        let mut cache = ContactCache::in_memory().unwrap();

        let err = syncer.sync(&mut cache, true).await.unwrap_err();

        assert!(matches!(err, ContactsError::Network(NetworkError::Timeout)));
        assert_eq!(*syncer.source().calls.lock(), 2);
        assert!(cache.cursor().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retention_override() {
        let syncer = ContactSyncer::new(flaky(0))
            .with_cursor_retention(std::time::Duration::from_secs(3600));
        assert_eq!(syncer.cursor_retention, Duration::hours(1));
    }
}

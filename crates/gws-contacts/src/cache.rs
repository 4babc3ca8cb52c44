//! SQLite-backed local mirror of remote contacts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};

use crate::error::ContactsError;
use crate::types::{CacheStatus, ChangeCounts, ContactChange, ContactEntry, SyncCursor};

const ENTRY_COLUMNS: &str =
    "resource_id, display_name, primary_email, primary_phone, organization, last_modified";

/// Columns every query relies on, per table.
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "contacts",
        &[
            "resource_id",
            "display_name",
            "primary_email",
            "primary_phone",
            "organization",
            "last_modified",
            "name_key",
            "email_key",
            "phone_key",
            "org_key",
        ],
    ),
    ("sync_cursor", &["id", "token", "issued_at"]),
];

/// Local contact cache for one profile.
pub struct ContactCache {
    conn: Connection,
}

impl ContactCache {
    /// Open (or create) the cache at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContactsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let cache = Self { conn };
        // A file we cannot bring to our schema is a damaged store, unless
        // another process merely holds the lock.
        cache.init_schema().map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => ContactsError::from(e),
            _ => ContactsError::CacheCorruption(e.to_string()),
        })?;
        cache.check_schema()?;
        tracing::debug!("Opened contact cache at {}", path.display());
        Ok(cache)
    }

    /// Open the cache at `path` and empty it. A corrupt store is destroyed
    /// and recreated instead.
    pub fn reset<P: AsRef<Path>>(path: P) -> Result<Self, ContactsError> {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(cache) => {
                cache.clear()?;
                Ok(cache)
            }
            Err(ContactsError::CacheCorruption(reason)) => {
                tracing::warn!("Contact cache is corrupt ({}), recreating it", reason);
                Self::destroy(path)?;
                Self::open(path)
            }
            Err(e) => Err(e),
        }
    }

    /// Create an in-memory cache.
    pub fn in_memory() -> Result<Self, ContactsError> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Remove the cache file and its journal siblings. Used to recover from
    /// corruption, when the file can no longer be opened.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<bool, ContactsError> {
        let path = path.as_ref();
        let mut removed = false;

        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut target = path.as_os_str().to_owned();
            target.push(suffix);
            match fs::remove_file(PathBuf::from(target)) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if removed {
            tracing::info!("Removed contact cache at {}", path.display());
        }
        Ok(removed)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                resource_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                primary_email TEXT,
                primary_phone TEXT,
                organization TEXT,
                last_modified INTEGER NOT NULL,
                name_key TEXT NOT NULL,
                email_key TEXT,
                phone_key TEXT,
                org_key TEXT
            );

            CREATE TABLE IF NOT EXISTS sync_cursor (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                token TEXT NOT NULL,
                issued_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(name_key, resource_id);
            "#,
        )?;
        Ok(())
    }

    fn check_schema(&self) -> Result<(), ContactsError> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        for (table, columns) in REQUIRED_COLUMNS {
            let present = stmt
                .query_map([table], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(missing) = columns.iter().find(|c| !present.iter().any(|p| p.as_str() == **c)) {
                return Err(ContactsError::CacheCorruption(format!(
                    "table {} is missing column {}",
                    table, missing
                )));
            }
        }
        Ok(())
    }

    /// Entries whose name, email, phone, or organization starts with
    /// `prefix`, case-insensitively, ordered by display name.
    pub fn search(&self, prefix: &str, limit: u32) -> Result<Vec<ContactEntry>, ContactsError> {
        if prefix.trim().is_empty() {
            return Err(ContactsError::Validation(
                "search prefix must not be empty".to_string(),
            ));
        }
        validate_limit(limit)?;

        let key = search_key(prefix);
        let key_len = key.chars().count();

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM contacts
             WHERE substr(name_key, 1, ?2) = ?1
                OR substr(email_key, 1, ?2) = ?1
                OR substr(phone_key, 1, ?2) = ?1
                OR substr(org_key, 1, ?2) = ?1
             ORDER BY name_key, resource_id
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![key, key_len, limit], Self::row_to_entry)?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All entries in search order, capped at `limit`.
    pub fn list(&self, limit: u32) -> Result<Vec<ContactEntry>, ContactsError> {
        validate_limit(limit)?;

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM contacts ORDER BY name_key, resource_id LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], Self::row_to_entry)?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get(&self, resource_id: &str) -> Result<Option<ContactEntry>, ContactsError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM contacts WHERE resource_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![resource_id], Self::row_to_entry)
            .optional()?)
    }

    pub fn count(&self) -> Result<u64, ContactsError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn cursor(&self) -> Result<Option<SyncCursor>, ContactsError> {
        Ok(self
            .conn
            .query_row(
                "SELECT token, issued_at FROM sync_cursor WHERE id = 1",
                [],
                |row| {
                    let issued_ms: i64 = row.get(1)?;
                    Ok(SyncCursor {
                        token: row.get(0)?,
                        issued_at: timestamp_from_millis(1, issued_ms)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn status(&self) -> Result<CacheStatus, ContactsError> {
        Ok(CacheStatus {
            entries: self.count()?,
            cursor: self.cursor()?,
        })
    }

    /// Delete every entry and the cursor.
    pub fn clear(&self) -> Result<(), ContactsError> {
        self.conn
            .execute_batch("DELETE FROM contacts; DELETE FROM sync_cursor;")?;
        tracing::info!("Cleared contact cache");
        Ok(())
    }

    /// Replace the whole cache with `entries` and store `cursor`, in one
    /// transaction. Counts are a diff against the previous content.
    pub fn replace_all(
        &mut self,
        entries: &[ContactEntry],
        cursor: Option<&SyncCursor>,
    ) -> Result<ChangeCounts, ContactsError> {
        let tx = self.conn.transaction()?;

        let sql = format!("SELECT {ENTRY_COLUMNS} FROM contacts");
        let mut stmt = tx.prepare(&sql)?;
        let existing = stmt
            .query_map([], Self::row_to_entry)?
            .map(|r| r.map(|e| (e.resource_id.clone(), e)))
            .collect::<Result<HashMap<_, _>, _>>()?;
        drop(stmt);

        // Later duplicates of the same id win.
        let incoming: HashMap<&str, &ContactEntry> =
            entries.iter().map(|e| (e.resource_id.as_str(), e)).collect();

        let mut counts = ChangeCounts::default();

        for id in existing.keys() {
            if !incoming.contains_key(id.as_str()) {
                tx.execute("DELETE FROM contacts WHERE resource_id = ?1", params![id])?;
                counts.deleted += 1;
            }
        }

        for (id, entry) in &incoming {
            match existing.get(*id) {
                Some(previous) if previous == *entry => {}
                Some(_) => {
                    Self::upsert(&tx, entry)?;
                    counts.updated += 1;
                }
                None => {
                    Self::upsert(&tx, entry)?;
                    counts.created += 1;
                }
            }
        }

        Self::store_cursor(&tx, cursor)?;
        tx.commit()?;

        Ok(counts)
    }

    /// Apply a change set and store `cursor`, in one transaction.
    pub fn apply_changes(
        &mut self,
        changes: &[ContactChange],
        cursor: Option<&SyncCursor>,
    ) -> Result<ChangeCounts, ContactsError> {
        let tx = self.conn.transaction()?;
        let mut counts = ChangeCounts::default();

        for change in changes {
            match change {
                ContactChange::Upsert(entry) => {
                    let known: bool = tx.query_row(
                        "SELECT EXISTS(SELECT 1 FROM contacts WHERE resource_id = ?1)",
                        params![entry.resource_id],
                        |row| row.get(0),
                    )?;
                    Self::upsert(&tx, entry)?;
                    if known {
                        counts.updated += 1;
                    } else {
                        counts.created += 1;
                    }
                }
                ContactChange::Delete(id) => {
                    let removed =
                        tx.execute("DELETE FROM contacts WHERE resource_id = ?1", params![id])?;
                    counts.deleted += removed as u64;
                }
            }
        }

        Self::store_cursor(&tx, cursor)?;
        tx.commit()?;

        Ok(counts)
    }

    fn upsert(tx: &Transaction<'_>, entry: &ContactEntry) -> Result<(), ContactsError> {
        tx.execute(
            r#"
            INSERT OR REPLACE INTO contacts
            (resource_id, display_name, primary_email, primary_phone, organization, last_modified,
             name_key, email_key, phone_key, org_key)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                entry.resource_id,
                entry.display_name,
                entry.primary_email,
                entry.primary_phone,
                entry.organization,
                entry.last_modified.timestamp_millis(),
                search_key(&entry.display_name),
                entry.primary_email.as_deref().map(search_key),
                entry.primary_phone.as_deref().map(search_key),
                entry.organization.as_deref().map(search_key),
            ],
        )?;
        Ok(())
    }

    /// `None` removes the cursor so the next sync runs in full.
    fn store_cursor(tx: &Transaction<'_>, cursor: Option<&SyncCursor>) -> Result<(), ContactsError> {
        match cursor {
            Some(cursor) => {
                tx.execute(
                    "INSERT OR REPLACE INTO sync_cursor (id, token, issued_at) VALUES (1, ?1, ?2)",
                    params![cursor.token, cursor.issued_at.timestamp_millis()],
                )?;
            }
            None => {
                tx.execute("DELETE FROM sync_cursor", [])?;
            }
        }
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<ContactEntry> {
        let modified_ms: i64 = row.get(5)?;
        Ok(ContactEntry {
            resource_id: row.get(0)?,
            display_name: row.get(1)?,
            primary_email: row.get(2)?,
            primary_phone: row.get(3)?,
            organization: row.get(4)?,
            last_modified: timestamp_from_millis(5, modified_ms)?,
        })
    }
}

/// Lower-cased one character at a time, so the key of a prefix is always a
/// prefix of the key (`str::to_lowercase` rewrites a word-final sigma).
fn search_key(value: &str) -> String {
    value.chars().flat_map(char::to_lowercase).collect()
}

fn validate_limit(limit: u32) -> Result<(), ContactsError> {
    if limit == 0 {
        return Err(ContactsError::Validation(
            "limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn timestamp_from_millis(column: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Integer,
            format!("timestamp {} out of range", ms).into(),
        )
    })
}

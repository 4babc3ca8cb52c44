use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

use parking_lot::Mutex;

use crate::credential::CredentialRecord;
use crate::error::AuthError;

/// Storage handle for one profile's Credential Record.
pub trait CredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>, AuthError>;
    fn save(&self, record: &CredentialRecord) -> Result<(), AuthError>;
    /// Returns whether a record existed.
    fn delete(&self) -> Result<bool, AuthError>;
}

/// JSON file store, one file per profile.
///
/// Every save replaces the file atomically so an interrupted write never
/// leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>, AuthError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: CredentialRecord = serde_json::from_str(&json).map_err(|e| {
            AuthError::Storage(format!("{} is unreadable: {}", self.path.display(), e))
        })?;

        tracing::debug!("Loaded credentials from {}", self.path.display());
        Ok(Some(record))
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        let json = serde_json::to_vec_pretty(record)?;
        atomic_write(&self.path, &json)?;

        tracing::info!("Stored credentials at {}", self.path.display());
        Ok(())
    }

    fn delete(&self) -> Result<bool, AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Deleted credentials at {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write to a temp sibling, fsync, then rename over `path`.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        AuthError::Storage(format!("Credential path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    record: Mutex<Option<CredentialRecord>>,
    saves: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CredentialRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<CredentialRecord>, AuthError> {
        Ok(self.record.lock().clone())
    }

    fn save(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        *self.record.lock() = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self) -> Result<bool, AuthError> {
        Ok(self.record.lock().take().is_some())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use chrono::{Duration, Utc};

    fn record() -> CredentialRecord {
        CredentialRecord {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry: Utc::now() + Duration::hours(1),
            granted_scopes: vec!["https://www.googleapis.com/auth/contacts.readonly".to_string()],
        }
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials/default.json"));
        assert!(store.load().unwrap().is_none());
        assert!(!store.delete().unwrap());
    }

    #[test]
    fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credentials/default.json"));
        let rec = record();

        store.save(&rec).unwrap();
        assert_eq!(store.load().unwrap(), Some(rec));

        assert!(store.delete().unwrap());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("default.json"));

        store.save(&record()).unwrap();
        store.save(&record()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["default.json".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("default.json"));
        store.save(&record()).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(matches!(store.load(), Err(AuthError::Storage(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&record()).unwrap();
        assert_eq!(store.save_count(), 1);
        assert!(store.load().unwrap().is_some());

        assert!(store.delete().unwrap());
        assert!(store.load().unwrap().is_none());
    }
}

//! Persisted client state.
//!
//! The auth client keeps its token blob in a [`SessionStorage`]; the same
//! storage also holds small UI preferences such as the theme flag.
//! [`FileStorage`] is shared by every process using the same state dir,
//! [`MemoryStorage`] lives and dies with the process.

use std::io::Write;
use std::path::PathBuf;

use dashmap::DashMap;
use thiserror::Error;
use tracing::warn;

use crate::models::auth::Session;

/// Key holding the theme preference.
pub const THEME_KEY: &str = "theme";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Key/value storage for persisted client state.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One file per key under a state directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Written to a temp file in the same directory and renamed into place,
    /// so a reader in another process never sees a partial value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Whether a raw token blob is present under `key`, without parsing it.
pub fn has_token(storage: &dyn SessionStorage, key: &str) -> bool {
    match storage.get(key) {
        Ok(raw) => raw.is_some_and(|v| !v.trim().is_empty()),
        Err(e) => {
            warn!(key, error = %e, "failed to read persisted token");
            false
        }
    }
}

/// Read the persisted session blob directly, bypassing the auth client.
///
/// Returns `None` when the blob is absent, unparsable, or lacks an access
/// token.
pub fn read_session(storage: &dyn SessionStorage, key: &str) -> Option<Session> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "failed to read persisted token");
            return None;
        }
    };
    match serde_json::from_str::<Session>(&raw) {
        Ok(session) if !session.access_token.is_empty() => Some(session),
        Ok(_) => None,
        Err(e) => {
            warn!(key, error = %e, "persisted token is not a session blob");
            None
        }
    }
}

/// UI theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

/// Load the theme preference (light unless `dark` is stored).
pub fn load_theme(storage: &dyn SessionStorage) -> Theme {
    match storage.get(THEME_KEY) {
        Ok(Some(v)) if v == "dark" => Theme::Dark,
        _ => Theme::Light,
    }
}

/// Flip and persist the theme preference, returning the new value.
pub fn toggle_theme(storage: &dyn SessionStorage) -> Result<Theme, StorageError> {
    let next = match load_theme(storage) {
        Theme::Light => Theme::Dark,
        Theme::Dark => Theme::Light,
    };
    storage.set(THEME_KEY, next.as_str())?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_roundtrip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get("k1").unwrap(), None);
        storage.set("k1", "v1").unwrap();
        assert_eq!(storage.get("k1").unwrap(), Some("v1".to_string()));
        storage.remove("k1").unwrap();
        assert_eq!(storage.get("k1").unwrap(), None);
        // removing a missing key is not an error
        storage.remove("k1").unwrap();
    }

    #[test]
    fn file_storage_overwrite_is_never_observed_partially() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let a = "a".repeat(64 * 1024);
        let b = "b".repeat(64 * 1024);
        storage.set("blob", &a).unwrap();

        let writer = {
            let storage = storage.clone();
            let (a, b) = (a.clone(), b.clone());
            std::thread::spawn(move || {
                for i in 0..200 {
                    storage.set("blob", if i % 2 == 0 { &b } else { &a }).unwrap();
                }
            })
        };
        for _ in 0..200 {
            let value = storage.get("blob").unwrap().unwrap();
            assert!(value == a || value == b, "read a partial value of {} bytes", value.len());
        }
        writer.join().unwrap();

        // only the key itself remains in the directory
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("blob")]);
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        assert!(matches!(
            storage.set("../escape", "x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(storage.get(""), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn read_session_parses_blob() {
        let storage = MemoryStorage::new();
        storage
            .set(
                "sb-x-auth-token",
                r#"{"access_token":"at","refresh_token":"rt","user":{"id":"u1"}}"#,
            )
            .unwrap();
        let session = read_session(&storage, "sb-x-auth-token").unwrap();
        assert_eq!(session.user.id, "u1");
        assert_eq!(session.refresh_token, "rt");
    }

    #[test]
    fn read_session_ignores_garbage_and_empty_tokens() {
        let storage = MemoryStorage::new();
        storage.set("k", "not json").unwrap();
        assert!(read_session(&storage, "k").is_none());
        assert!(has_token(&storage, "k"));

        storage
            .set("k", r#"{"access_token":"","user":{"id":"u1"}}"#)
            .unwrap();
        assert!(read_session(&storage, "k").is_none());
        assert!(!has_token(&storage, "missing"));
    }

    #[test]
    fn theme_toggles_and_persists() {
        let storage = MemoryStorage::new();
        assert_eq!(load_theme(&storage), Theme::Light);
        assert_eq!(toggle_theme(&storage).unwrap(), Theme::Dark);
        assert_eq!(storage.get(THEME_KEY).unwrap(), Some("dark".to_string()));
        assert_eq!(toggle_theme(&storage).unwrap(), Theme::Light);
        assert_eq!(load_theme(&storage), Theme::Light);
    }
}

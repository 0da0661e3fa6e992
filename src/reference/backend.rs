use super::subscription::{Subscribers, Subscription};
use crate::error::{LoadError, SaveError};
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Storage consumed by [`PersistedReference`](super::PersistedReference).
///
/// Values travel as JSON documents. `subscribe` reports changes to a key
/// made by anyone, including the subscriber itself; references ignore
/// reloads that do not change their value.
pub trait PersistenceBackend: Send + Sync + 'static {
    /// Read the stored document. `Ok(None)` means the key was never written.
    fn load(&self, key: &str) -> Result<Option<Json>, LoadError>;

    fn save(&self, key: &str, value: Json) -> Result<(), SaveError>;

    fn subscribe(&self, key: &str, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription;
}

/// Per-key change notification shared by the bundled backends.
#[derive(Default)]
struct Watchers {
    keys: Mutex<HashMap<String, Arc<Subscribers<()>>>>,
}

impl Watchers {
    fn subscribe(&self, key: &str, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription {
        let subscribers = Arc::clone(
            self.keys
                .lock()
                .entry(key.to_string())
                .or_insert_with(Subscribers::new),
        );
        subscribers.insert(Box::new(move |_: &()| on_change()))
    }

    fn notify(&self, key: &str) {
        let subscribers = self.keys.lock().get(key).cloned();
        if let Some(subscribers) = subscribers {
            subscribers.notify(&());
        }
    }
}

/// Backend that keeps documents in a map. Useful in tests and previews.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Json>>,
    watchers: Watchers,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw document as if another process had stored it.
    pub fn insert_raw(&self, key: &str, value: Json) {
        self.entries.lock().insert(key.to_string(), value);
        self.watchers.notify(key);
    }

    pub fn raw(&self, key: &str) -> Option<Json> {
        self.entries.lock().get(key).cloned()
    }
}

impl PersistenceBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<Json>, LoadError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: Json) -> Result<(), SaveError> {
        self.entries.lock().insert(key.to_string(), value);
        self.watchers.notify(key);
        Ok(())
    }

    fn subscribe(&self, key: &str, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.watchers.subscribe(key, on_change)
    }
}

/// Backend storing one pretty-printed JSON file per key in a directory.
///
/// Change notification covers writes made through this backend instance.
pub struct FileBackend {
    dir: PathBuf,
    watchers: Watchers,
}

impl FileBackend {
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            watchers: Watchers::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that stores `key`.
    ///
    /// `[A-Za-z0-9.-]` are kept; every other byte of the key, `_` included,
    /// is written as `_` plus two hex digits, so distinct keys never share a file.
    pub fn file_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-') {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("_{byte:02X}"));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

impl PersistenceBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<Json>, LoadError> {
        let path = self.file_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(LoadError::Backend {
                    key: key.to_string(),
                    message: format!("{}: {err}", path.display()),
                })
            }
        };
        tracing::debug!(key, path = %path.display(), "loaded");
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| LoadError::Decode {
                key: key.to_string(),
                source,
            })
    }

    fn save(&self, key: &str, value: Json) -> Result<(), SaveError> {
        let path = self.file_for(key);
        let backend_error = |err: io::Error| SaveError::Backend {
            key: key.to_string(),
            message: format!("{}: {err}", path.display()),
        };
        let bytes = serde_json::to_vec_pretty(&value).map_err(|source| SaveError::Encode {
            key: key.to_string(),
            source,
        })?;

        fs::create_dir_all(&self.dir).map_err(backend_error)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, bytes).map_err(backend_error)?;
        fs::rename(&staging, &path).map_err(backend_error)?;
        tracing::debug!(key, path = %path.display(), "saved");

        self.watchers.notify(key);
        Ok(())
    }

    fn subscribe(&self, key: &str, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription {
        self.watchers.subscribe(key, on_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn memory_backend_round_trip_and_notify() {
        let backend = MemoryBackend::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = backend.subscribe(
            "count",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(backend.load("count").unwrap(), None);
        backend.save("count", json!(3)).unwrap();
        assert_eq!(backend.load("count").unwrap(), Some(json!(3)));
        backend.save("other", json!(1)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("state"));
        assert_eq!(backend.load("settings").unwrap(), None);

        backend
            .save("settings", json!({ "theme": "dark", "volume": 7 }))
            .unwrap();
        assert_eq!(
            backend.load("settings").unwrap(),
            Some(json!({ "theme": "dark", "volume": 7 }))
        );
        assert!(backend.file_for("settings").exists());
    }

    #[test]
    fn file_backend_reports_corrupt_documents() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        fs::write(backend.file_for("broken"), b"{ not json").unwrap();
        match backend.load("broken") {
            Err(LoadError::Decode { key, .. }) => assert_eq!(key, "broken"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn file_names_are_escaped() {
        let backend = FileBackend::new("/tmp/statebox");
        let file = backend.file_for("user/settings v2");
        assert_eq!(file.file_name().unwrap(), "user_2Fsettings_20v2.json");
        assert_eq!(
            backend.file_for("app.theme-1").file_name().unwrap(),
            "app.theme-1.json"
        );
    }

    #[test]
    fn keys_differing_only_in_escaped_characters_use_different_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());
        assert_ne!(backend.file_for("a/b"), backend.file_for("a_b"));

        backend.save("a/b", json!(1)).unwrap();
        backend.save("a_b", json!(2)).unwrap();
        assert_eq!(backend.load("a/b").unwrap(), Some(json!(1)));
        assert_eq!(backend.load("a_b").unwrap(), Some(json!(2)));
    }
}

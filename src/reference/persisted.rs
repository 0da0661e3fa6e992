use super::backend::PersistenceBackend;
use super::reference::{Cell, Reference, ReferenceId};
use super::subscription::Subscription;
use crate::error::{LoadError, PersistenceError, ReferenceError, SaveError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Side channel for persistence failures.
pub type ErrorSink = Arc<dyn Fn(&PersistenceError) + Send + Sync>;

fn log_errors() -> ErrorSink {
    Arc::new(|err: &PersistenceError| {
        tracing::warn!(key = err.key(), error = %err, "persistence error");
    })
}

/// Bounds for values stored through a [`PersistedReference`].
pub trait Persistable:
    Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static
{
}

impl<T> Persistable for T where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static
{
}

struct Entry {
    type_name: &'static str,
    reference: Weak<dyn Any + Send + Sync>,
}

type Registry = Arc<Mutex<HashMap<String, Entry>>>;

struct Inner {
    backend: Arc<dyn PersistenceBackend>,
    sink: ErrorSink,
    live: Registry,
}

/// Registry handing out persisted references, at most one live reference per key.
///
/// # Examples
///
/// ```
/// use statebox::reference::{MemoryBackend, Persistence, Reference};
///
/// let persistence = Persistence::new(MemoryBackend::new());
/// let a = persistence.reference("volume", 5u8).unwrap();
/// let b = persistence.reference("volume", 0u8).unwrap();
/// a.set(9);
/// assert_eq!(*b.load(), 9);
/// assert_eq!(a.id(), b.id());
/// ```
#[derive(Clone)]
pub struct Persistence {
    inner: Arc<Inner>,
}

impl Persistence {
    pub fn new(backend: impl PersistenceBackend) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                sink: log_errors(),
                live: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }

    /// Route load and save failures to `sink` instead of the log.
    ///
    /// The returned registry shares its open references with `self` and every
    /// clone of it. References already open keep the sink they were opened with.
    pub fn with_error_sink(self, sink: impl Fn(&PersistenceError) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend: Arc::clone(&self.inner.backend),
                sink: Arc::new(sink),
                live: Arc::clone(&self.inner.live),
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn PersistenceBackend> {
        &self.inner.backend
    }

    /// The live reference for `key`, opening it with `default` as fallback if none exists.
    ///
    /// `default` is ignored when the key is already open.
    pub fn reference<V: Persistable>(
        &self,
        key: &str,
        default: V,
    ) -> Result<Arc<PersistedReference<V>>, ReferenceError> {
        let requested = std::any::type_name::<V>();
        let mut live = self.inner.live.lock();
        if let Some(entry) = live.get(key) {
            if let Some(existing) = entry.reference.upgrade() {
                return existing
                    .downcast::<PersistedReference<V>>()
                    .map_err(|_| ReferenceError::TypeMismatch {
                        key: key.to_string(),
                        existing: entry.type_name,
                        requested,
                    });
            }
        }

        let reference = PersistedReference::open(
            key.to_string(),
            default,
            Arc::clone(&self.inner.backend),
            Arc::clone(&self.inner.sink),
        );
        let erased: Arc<dyn Any + Send + Sync> = reference.clone();
        live.insert(
            key.to_string(),
            Entry {
                type_name: requested,
                reference: Arc::downgrade(&erased),
            },
        );
        Ok(reference)
    }

    /// Number of keys with a live reference.
    pub fn live_keys(&self) -> usize {
        let mut live = self.inner.live.lock();
        live.retain(|_, entry| entry.reference.strong_count() > 0);
        live.len()
    }
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistence")
            .field("live_keys", &self.inner.live.lock().len())
            .finish()
    }
}

/// A reference whose value is written through to a [`PersistenceBackend`].
///
/// Loads that fail fall back to the default value; saves happen after each
/// committed change. Both report failures on the [`ErrorSink`] only.
///
/// Writers hold `saving` from commit until the backend has stored the value,
/// so the backend receives values in commit order and the last commit is the
/// last save.
pub struct PersistedReference<V> {
    key: String,
    cell: Cell<V>,
    backend: Arc<dyn PersistenceBackend>,
    sink: ErrorSink,
    saving: Mutex<()>,
    watch: Mutex<Option<Subscription>>,
}

impl<V: Persistable> PersistedReference<V> {
    fn open(
        key: String,
        default: V,
        backend: Arc<dyn PersistenceBackend>,
        sink: ErrorSink,
    ) -> Arc<Self> {
        let initial = match load::<V>(backend.as_ref(), &key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                sink(&err.into());
                default
            }
        };
        let reference = Arc::new(Self {
            key,
            cell: Cell::new(initial),
            backend,
            sink,
            saving: Mutex::new(()),
            watch: Mutex::new(None),
        });

        let weak = Arc::downgrade(&reference);
        let watch = reference.backend.subscribe(
            &reference.key,
            Box::new(move || {
                if let Some(reference) = weak.upgrade() {
                    reference.reload();
                }
            }),
        );
        *reference.watch.lock() = Some(watch);
        tracing::debug!(
            key = %reference.key,
            id = %reference.cell.id(),
            "opened persisted reference"
        );
        reference
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Pick up a change the backend reports.
    ///
    /// Skipped while a write is being saved: either it is this reference's own
    /// save echoing back, or that save is about to replace the document anyway.
    fn reload(&self) {
        let Some(saving) = self.saving.try_lock() else {
            return;
        };
        match load::<V>(self.backend.as_ref(), &self.key) {
            Ok(Some(value)) => {
                self.cell.commit(&mut |slot| *slot = value.clone());
            }
            Ok(None) => {}
            Err(err) => (self.sink)(&err.into()),
        }
        drop(saving);
        self.cell.deliver();
    }

    fn save(&self, value: &V) {
        let result = serde_json::to_value(value)
            .map_err(|source| SaveError::Encode {
                key: self.key.clone(),
                source,
            })
            .and_then(|json| self.backend.save(&self.key, json));
        if let Err(err) = result {
            (self.sink)(&err.into());
        }
    }
}

fn load<V: Persistable>(
    backend: &dyn PersistenceBackend,
    key: &str,
) -> Result<Option<V>, LoadError> {
    match backend.load(key)? {
        Some(json) => serde_json::from_value(json)
            .map(Some)
            .map_err(|source| LoadError::Decode {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

impl<V: Persistable> Reference<V> for PersistedReference<V> {
    fn id(&self) -> ReferenceId {
        self.cell.id()
    }

    fn load(&self) -> Arc<V> {
        self.cell.load()
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut V)) {
        {
            let _saving = self.saving.lock();
            if let Some(committed) = self.cell.commit(mutate) {
                self.save(&committed);
            }
        }
        self.cell.deliver();
    }

    fn subscribe(&self, on_change: Box<dyn Fn(&V) + Send + Sync>) -> Subscription {
        self.cell.subscribe(on_change)
    }

    fn describe(&self) -> String {
        format!("{}({})", self.cell.id(), self.key)
    }
}

impl<V: Persistable + fmt::Debug> fmt::Debug for PersistedReference<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedReference")
            .field("key", &self.key)
            .field("value", &self.cell.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::MemoryBackend;
    use serde::Deserialize;
    use serde_json::{json, Value as Json};
    use std::thread;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Settings {
        theme: String,
        volume: u8,
    }

    fn defaults() -> Settings {
        Settings {
            theme: "light".into(),
            volume: 5,
        }
    }

    fn collecting() -> (Persistence, Arc<Mutex<Vec<String>>>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let persistence = Persistence::from_arc(backend.clone())
            .with_error_sink(move |err| sink.lock().push(err.key().to_string()));
        (persistence, errors, backend)
    }

    #[test]
    fn missing_key_uses_default_and_writes_through() {
        let (persistence, errors, backend) = collecting();
        let reference = persistence.reference("settings", defaults()).unwrap();
        assert_eq!(*reference.load(), defaults());

        reference.update(&mut |s| s.volume = 9);
        assert_eq!(
            backend.raw("settings"),
            Some(json!({ "theme": "light", "volume": 9 }))
        );
        assert!(errors.lock().is_empty());
    }

    #[test]
    fn decode_failure_falls_back_and_reports() {
        let (persistence, errors, backend) = collecting();
        backend.insert_raw("settings", json!("not settings"));

        let reference = persistence.reference("settings", defaults()).unwrap();
        assert_eq!(*reference.load(), defaults());
        assert_eq!(*errors.lock(), vec!["settings".to_string()]);
    }

    #[test]
    fn external_changes_are_reloaded() {
        let (persistence, _errors, backend) = collecting();
        let reference = persistence.reference("settings", defaults()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let _sub = reference.subscribe(Box::new(move |s: &Settings| log.lock().push(s.volume)));

        backend.insert_raw("settings", json!({ "theme": "dark", "volume": 1 }));
        assert_eq!(reference.load().theme, "dark");
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn one_reference_per_key() {
        let (persistence, _errors, _backend) = collecting();
        let a = persistence.reference("settings", defaults()).unwrap();
        let b = persistence.reference("settings", defaults()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(persistence.live_keys(), 1);

        drop(a);
        drop(b);
        assert_eq!(persistence.live_keys(), 0);
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let (persistence, _errors, _backend) = collecting();
        let _count = persistence.reference("key", 1u32).unwrap();
        let err = persistence.reference("key", String::new()).unwrap_err();
        assert!(matches!(err, ReferenceError::TypeMismatch { .. }));
    }

    #[test]
    fn error_sink_keeps_one_reference_per_key() {
        let persistence = Persistence::new(MemoryBackend::new());
        let a = persistence.reference("count", 1u32).unwrap();
        let quiet = persistence.clone().with_error_sink(|_| {});

        let b = persistence.reference("count", 1u32).unwrap();
        let c = quiet.reference("count", 1u32).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(persistence.live_keys(), 1);
    }

    /// Memory backend whose save of one particular document is slow.
    struct SlowSave {
        inner: MemoryBackend,
        slow: Json,
    }

    impl PersistenceBackend for SlowSave {
        fn load(&self, key: &str) -> Result<Option<Json>, LoadError> {
            self.inner.load(key)
        }

        fn save(&self, key: &str, value: Json) -> Result<(), SaveError> {
            if value == self.slow {
                thread::sleep(Duration::from_millis(150));
            }
            self.inner.save(key, value)
        }

        fn subscribe(&self, key: &str, on_change: Box<dyn Fn() + Send + Sync>) -> Subscription {
            self.inner.subscribe(key, on_change)
        }
    }

    #[test]
    fn concurrent_writes_are_saved_in_commit_order() {
        let backend = Arc::new(SlowSave {
            inner: MemoryBackend::new(),
            slow: json!(1),
        });
        let persistence = Persistence::from_arc(backend.clone());
        let reference = persistence.reference("count", 0u32).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let _sub = reference.subscribe(Box::new(move |value: &u32| log.lock().push(*value)));

        let first = {
            let reference = Arc::clone(&reference);
            thread::spawn(move || reference.set(1))
        };
        // The first write has committed and is stuck saving.
        while *reference.load() != 1 {
            thread::yield_now();
        }
        let second = {
            let reference = Arc::clone(&reference);
            thread::spawn(move || reference.set(2))
        };
        first.join().unwrap();
        second.join().unwrap();

        assert_eq!(*reference.load(), 2);
        assert_eq!(backend.inner.raw("count"), Some(json!(2)));
        assert_eq!(*seen.lock(), vec![1, 2]);
    }
}

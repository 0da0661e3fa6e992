use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// What happened to a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A store (root or child) was created.
    Init,
    /// The last handle to a store was dropped.
    Deinit,
    /// `scope` or `scope_case` was called on a store.
    Scope,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Init => f.write_str("init"),
            EventKind::Deinit => f.write_str("deinit"),
            EventKind::Scope => f.write_str("scope"),
        }
    }
}

/// A single recorded lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreEvent {
    pub kind: EventKind,
    pub store: u64,
    pub label: String,
}

impl fmt::Display for StoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}.{}", self.label, self.store, self.kind)
    }
}

/// Identity allocation and lifecycle bookkeeping for stores and references.
///
/// Supports both a global runtime (default) and scoped runtimes for isolation.
/// Stores capture the current runtime when they are created, so events raised
/// later from effect worker threads still land in the right log.
///
/// # Examples
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use statebox::runtime::{EventKind, Runtime};
/// use statebox::{Effect, Store};
///
/// Runtime::scope(|| {
///     let store = Store::new(0, |count: &mut i32, delta: i32| {
///         *count += delta;
///         Effect::none()
///     });
///     store.send(2).wait();
///     assert_eq!(store.state(), 2);
///     assert_eq!(Runtime::current().count(EventKind::Init, ""), 1);
/// });
/// ```
pub struct Runtime {
    next_id: AtomicU64,
    recording: AtomicBool,
    events: Mutex<Vec<StoreEvent>>,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<Runtime>>> = const { RefCell::new(Vec::new()) };
}

impl Runtime {
    /// Create a new isolated runtime.
    pub fn new() -> Arc<Self> {
        Arc::new(Runtime {
            next_id: AtomicU64::new(1),
            recording: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        })
    }

    /// Run a function with a fresh, recording runtime.
    ///
    /// The runtime is popped when the function returns; stores created inside
    /// keep it alive for as long as they exist.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        runtime.set_recording(true);
        Self::with_runtime(runtime, f)
    }

    /// Get or create the global runtime (fallback).
    ///
    /// The global runtime does not record lifecycle events unless asked to.
    pub fn global() -> Arc<Self> {
        static RUNTIME: OnceLock<Arc<Runtime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// Get the current runtime (scoped or global fallback).
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_else(Self::global))
    }

    /// Run a function with a specific runtime as the current context.
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Generate the next unique id for a store or reference.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Turn lifecycle recording on or off.
    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub(crate) fn record(&self, kind: EventKind, store: u64, label: &str) {
        tracing::debug!(%kind, store, label, "store lifecycle");
        if self.is_recording() {
            self.events.lock().push(StoreEvent {
                kind,
                store,
                label: label.to_string(),
            });
        }
    }

    /// Snapshot of every recorded event, in order.
    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().clone()
    }

    /// Drain the event log.
    pub fn take_events(&self) -> Vec<StoreEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Count recorded events of `kind` whose label contains `label`.
    ///
    /// An empty `label` matches every store.
    pub fn count(&self, kind: EventKind, label: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind == kind && event.label.contains(label))
            .count()
    }

    /// Clear recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .field("recording", &self.is_recording())
            .field("events", &self.events.lock().len())
            .finish()
    }
}

/// Short, human-readable name for a type: `my_app::feature::State` becomes `State`,
/// generic arguments keep their short names too.
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
    out
}

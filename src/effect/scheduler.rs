use super::cancel::{CancelId, CancellationToken};
use super::effect::{CallbackSink, Effect, Emitter, Op, Sink, Work};
use crate::store::{Task, TaskGroup};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// Worker thread settings for a [`Scheduler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Prefix for worker thread names; the effect number is appended.
    pub thread_name: String,
    /// Worker stack size in bytes. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: "statebox-effect".to_string(),
            stack_size: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

struct Running {
    ids: Vec<CancelId>,
    owners: Arc<[u64]>,
    token: CancellationToken,
    group: TaskGroup,
}

struct Inner {
    next: AtomicU64,
    running: Mutex<HashMap<u64, Running>>,
}

impl Inner {
    fn finish(&self, key: u64) {
        let entry = self.running.lock().remove(&key);
        if let Some(entry) = entry {
            tracing::debug!(effect = key, "effect finished");
            entry.group.leave();
        }
    }

    fn cancel_where(&self, reason: &str, mut matches: impl FnMut(&Running) -> bool) -> usize {
        let cancelled: Vec<(u64, Running)> = {
            let mut running = self.running.lock();
            let keys: Vec<u64> = running
                .iter()
                .filter(|(_, entry)| matches(entry))
                .map(|(key, _)| *key)
                .collect();
            keys.into_iter()
                .filter_map(|key| running.remove(&key).map(|entry| (key, entry)))
                .collect()
        };
        for (key, entry) in &cancelled {
            tracing::debug!(effect = key, reason, "effect cancelled");
            entry.token.cancel();
            entry.group.leave();
        }
        cancelled.len()
    }
}

/// Deregisters an effect when its worker exits, including by panic.
struct Finish {
    inner: Arc<Inner>,
    key: u64,
}

impl Drop for Finish {
    fn drop(&mut self) {
        self.inner.finish(self.key);
    }
}

/// Runs effects on worker threads and tracks them for cancellation.
///
/// Each store tree owns one scheduler. Every running effect remembers the
/// lineage of stores whose action started it, so a child store can cancel
/// exactly its own work. Dropping the scheduler cancels everything.
pub struct Scheduler {
    config: SchedulerConfig,
    inner: Arc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Inner {
                next: AtomicU64::new(1),
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run `effect` outside of any store, handing emitted actions to `deliver`.
    ///
    /// `deliver` is called on the thread that emitted the action.
    pub fn run<A: Send + 'static>(
        &self,
        effect: Effect<A>,
        deliver: impl Fn(A) + Send + Sync + 'static,
    ) -> Task {
        let group = TaskGroup::new();
        let sink: Arc<dyn Sink<A>> = Arc::new(CallbackSink::new(deliver));
        for op in effect.into_ops() {
            match op {
                Op::Send(action) => {
                    sink.enqueue(action);
                    sink.flush();
                }
                Op::Cancel(id) => {
                    self.cancel(id);
                }
                Op::Run { ids, work } => {
                    self.spawn(work, ids, Arc::from(Vec::new()), Arc::clone(&sink), &group)
                }
            }
        }
        Task::new(group)
    }

    pub(crate) fn spawn<A: Send + 'static>(
        &self,
        work: Work<A>,
        ids: Vec<CancelId>,
        owners: Arc<[u64]>,
        sink: Arc<dyn Sink<A>>,
        group: &TaskGroup,
    ) {
        let key = self.inner.next.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        group.enter();
        self.inner.running.lock().insert(
            key,
            Running {
                ids,
                owners,
                token: token.clone(),
                group: group.clone(),
            },
        );

        let finish = Finish {
            inner: Arc::clone(&self.inner),
            key,
        };
        let emitter = Emitter::new(token, sink);
        let mut builder = thread::Builder::new().name(format!("{}-{key}", self.config.thread_name));
        if let Some(bytes) = self.config.stack_size {
            builder = builder.stack_size(bytes);
        }
        tracing::debug!(effect = key, "effect started");
        let spawned = builder.spawn(move || {
            let _finish = finish;
            work(emitter);
        });
        if let Err(err) = spawned {
            // The closure, and with it `finish`, is dropped on failure.
            tracing::error!(effect = key, error = %err, "failed to spawn effect worker");
        }
    }

    /// Cancel every running effect tagged with `id`. Returns how many were cancelled.
    pub fn cancel(&self, id: CancelId) -> usize {
        self.inner
            .cancel_where("id", |entry| entry.ids.contains(&id))
    }

    /// Cancel every running effect started by an action sent through store `owner`
    /// or one of its descendants.
    pub fn cancel_owner(&self, owner: u64) -> usize {
        self.inner
            .cancel_where("owner", |entry| entry.owners.contains(&owner))
    }

    pub fn cancel_all(&self) -> usize {
        self.inner.cancel_where("all", |_| true)
    }

    /// Number of effects started and neither finished nor cancelled.
    pub fn in_flight(&self) -> usize {
        self.inner.running.lock().len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

use super::cache::ScopeCache;
use super::reducer::Reducer;
use super::task::TaskGroup;
use crate::effect::{Effect, Hold, Op, Scheduler, Sink};
use crate::path::{CasePath, KeyPath};
use crate::reference::{Subscribers, Subscription};
use crate::runtime::{EventKind, Runtime};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Ids of the stores an action passed through, from the sender up to the root.
pub(crate) type Lineage = Arc<[u64]>;

/// What every store in a tree can do; the root owns state and queue, children
/// project and forward.
pub(crate) trait StoreCore<S, A>: Send + Sync {
    fn id(&self) -> u64;

    fn label(&self) -> &str;

    fn runtime(&self) -> &Arc<Runtime>;

    fn scheduler(&self) -> &Scheduler;

    fn scopes(&self) -> &ScopeCache;

    /// Visit the last committed state.
    fn read(&self, visit: &mut dyn FnMut(&S));

    fn dispatch(&self, action: A, lineage: Vec<u64>, group: &TaskGroup);

    /// Called with the store's state after every committed reduce.
    fn watch(&self, on_commit: Box<dyn Fn(&S) + Send + Sync>) -> Subscription;

    fn is_live(&self) -> bool;
}

struct Queued<A> {
    action: A,
    lineage: Lineage,
    group: TaskGroup,
}

struct Queue<A> {
    pending: VecDeque<Queued<A>>,
    draining: bool,
}

/// Lets the next send drain again if a reducer or observer panics mid-drain.
struct DrainGuard<'a, A> {
    queue: &'a Mutex<Queue<A>>,
    reducing: &'a AtomicBool,
}

impl<A> Drop for DrainGuard<'_, A> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.reducing.store(false, Ordering::Release);
            self.queue.lock().draining = false;
        }
    }
}

/// Marks a queued action done when processing ends, including by panic.
struct Processed(TaskGroup);

impl Drop for Processed {
    fn drop(&mut self) {
        self.0.leave();
    }
}

pub(crate) struct RootCore<S, A> {
    id: u64,
    label: String,
    runtime: Arc<Runtime>,
    reducer: Box<dyn Reducer<S, A>>,
    state: Mutex<S>,
    snapshot: ArcSwap<S>,
    queue: Mutex<Queue<A>>,
    reducing: AtomicBool,
    observers: Arc<Subscribers<S>>,
    scheduler: Scheduler,
    scopes: ScopeCache,
    this: Weak<RootCore<S, A>>,
}

impl<S, A> RootCore<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    pub(crate) fn new(
        initial: S,
        reducer: Box<dyn Reducer<S, A>>,
        runtime: Arc<Runtime>,
        scheduler: Scheduler,
        label: String,
    ) -> Arc<Self> {
        let id = runtime.next_id();
        let core = Arc::new_cyclic(|this| RootCore {
            id,
            label,
            runtime,
            reducer,
            snapshot: ArcSwap::from_pointee(initial.clone()),
            state: Mutex::new(initial),
            queue: Mutex::new(Queue {
                pending: VecDeque::new(),
                draining: false,
            }),
            reducing: AtomicBool::new(false),
            observers: Subscribers::new(),
            scheduler,
            scopes: ScopeCache::default(),
            this: this.clone(),
        });
        core.runtime.record(EventKind::Init, id, &core.label);
        core
    }

    fn enqueue(&self, queued: Queued<A>) {
        queued.group.enter();
        self.queue.lock().pending.push_back(queued);
    }

    /// Process queued actions unless another call is already doing so.
    fn drain(&self) {
        {
            let mut queue = self.queue.lock();
            if queue.draining || queue.pending.is_empty() {
                return;
            }
            queue.draining = true;
        }
        let _guard = DrainGuard {
            queue: &self.queue,
            reducing: &self.reducing,
        };
        loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.process(next);
        }
    }

    fn process(&self, queued: Queued<A>) {
        let Queued {
            action,
            lineage,
            group,
        } = queued;
        let processed = Processed(group);

        let reentered = self.reducing.swap(true, Ordering::AcqRel);
        debug_assert!(!reentered, "reduce re-entered on {}", self.label);
        let (effect, snapshot) = {
            let mut state = self.state.lock();
            tracing::trace!(store = self.id, label = %self.label, "reduce");
            let effect = self.reducer.reduce(&mut state, action);
            let snapshot = Arc::new(S::clone(&state));
            self.snapshot.store(Arc::clone(&snapshot));
            (effect, snapshot)
        };
        self.reducing.store(false, Ordering::Release);

        self.observers.notify(&snapshot);
        self.start(effect, &lineage, &processed.0);
    }

    fn start(&self, effect: Effect<A>, lineage: &Lineage, group: &TaskGroup) {
        for op in effect.into_ops() {
            match op {
                Op::Send(action) => self.enqueue(Queued {
                    action,
                    lineage: Arc::clone(lineage),
                    group: group.clone(),
                }),
                Op::Cancel(id) => {
                    self.scheduler.cancel(id);
                }
                Op::Run { ids, work } => {
                    let sink: Arc<dyn Sink<A>> = Arc::new(StoreSink {
                        core: self.this.clone(),
                        lineage: Arc::clone(lineage),
                        group: group.clone(),
                    });
                    self.scheduler
                        .spawn(work, ids, Arc::clone(lineage), sink, group);
                }
            }
        }
    }
}

impl<S, A> StoreCore<S, A> for RootCore<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fn id(&self) -> u64 {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn scopes(&self) -> &ScopeCache {
        &self.scopes
    }

    fn read(&self, visit: &mut dyn FnMut(&S)) {
        let snapshot = self.snapshot.load_full();
        visit(&*snapshot);
    }

    fn dispatch(&self, action: A, mut lineage: Vec<u64>, group: &TaskGroup) {
        lineage.push(self.id);
        tracing::trace!(store = self.id, depth = lineage.len(), "action queued");
        self.enqueue(Queued {
            action,
            lineage: Arc::from(lineage),
            group: group.clone(),
        });
        self.drain();
    }

    fn watch(&self, on_commit: Box<dyn Fn(&S) + Send + Sync>) -> Subscription {
        self.observers.insert(on_commit)
    }

    fn is_live(&self) -> bool {
        true
    }
}

impl<S, A> Drop for RootCore<S, A> {
    fn drop(&mut self) {
        self.runtime.record(EventKind::Deinit, self.id, &self.label);
    }
}

/// Feeds actions emitted by running work back into a root store.
struct StoreSink<S, A> {
    core: Weak<RootCore<S, A>>,
    lineage: Lineage,
    group: TaskGroup,
}

impl<S, A> Sink<A> for StoreSink<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fn enqueue(&self, action: A) -> Hold {
        match self.core.upgrade() {
            Some(core) => {
                core.enqueue(Queued {
                    action,
                    lineage: Arc::clone(&self.lineage),
                    group: self.group.clone(),
                });
                let hold: Box<dyn Send> = Box::new(core);
                Some(hold)
            }
            None => {
                tracing::debug!("store dropped, effect action discarded");
                None
            }
        }
    }

    fn flush(&self) {
        if let Some(core) = self.core.upgrade() {
            core.drain();
        }
    }
}

/// How a child reaches its state inside the parent's.
pub(crate) enum StateLens<PS, S> {
    Key(KeyPath<PS, S>),
    /// `last` keeps the most recent value of the case for reads after it is gone.
    Case {
        path: CasePath<PS, S>,
        last: ArcSwap<S>,
    },
}

pub(crate) struct ChildCore<PS, PA, S, A> {
    id: u64,
    label: String,
    runtime: Arc<Runtime>,
    parent: Arc<dyn StoreCore<PS, PA>>,
    state: StateLens<PS, S>,
    action: CasePath<PA, A>,
    live: AtomicBool,
    watch: Mutex<Option<Subscription>>,
    scopes: ScopeCache,
}

impl<PS, PA, S, A> ChildCore<PS, PA, S, A>
where
    PS: 'static,
    PA: 'static,
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fn create(
        parent: Arc<dyn StoreCore<PS, PA>>,
        state: StateLens<PS, S>,
        action: CasePath<PA, A>,
        label: String,
    ) -> Arc<Self> {
        let runtime = Arc::clone(parent.runtime());
        let id = runtime.next_id();
        runtime.record(EventKind::Init, id, &label);
        Arc::new(ChildCore {
            id,
            label,
            runtime,
            parent,
            state,
            action,
            live: AtomicBool::new(true),
            watch: Mutex::new(None),
            scopes: ScopeCache::default(),
        })
    }

    /// A child over a field of the parent's state.
    pub(crate) fn keyed(
        parent: Arc<dyn StoreCore<PS, PA>>,
        state: KeyPath<PS, S>,
        action: CasePath<PA, A>,
        label: String,
    ) -> Arc<Self> {
        Self::create(parent, StateLens::Key(state), action, label)
    }

    /// A child over one case of the parent's state, invalidated once the parent
    /// commits a state outside that case.
    pub(crate) fn cased(
        parent: Arc<dyn StoreCore<PS, PA>>,
        state: CasePath<PS, S>,
        action: CasePath<PA, A>,
        initial: S,
        label: String,
    ) -> Arc<Self> {
        let path = state.clone();
        let lens = StateLens::Case {
            path: state,
            last: ArcSwap::from_pointee(initial),
        };
        let core = Self::create(Arc::clone(&parent), lens, action, label);

        let weak = Arc::downgrade(&core);
        let watched = path.clone();
        let watch = parent.watch(Box::new(move |parent_state: &PS| {
            let Some(core) = weak.upgrade() else {
                return;
            };
            match watched.extract(parent_state) {
                Some(state) => core.remember(state),
                None => core.invalidate(),
            }
        }));
        *core.watch.lock() = Some(watch);

        // The parent may have left the case before the watch was installed.
        let mut present = true;
        parent.read(&mut |parent_state: &PS| present = path.matches(parent_state));
        if !present {
            core.invalidate();
        }
        core
    }

    fn remember(&self, state: &S) {
        if let StateLens::Case { last, .. } = &self.state {
            last.store(Arc::new(state.clone()));
        }
    }

    fn invalidate(&self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }
        let cancelled = self.parent.scheduler().cancel_owner(self.id);
        tracing::debug!(store = self.id, label = %self.label, cancelled, "store invalidated");
        let watch = self.watch.lock().take();
        drop(watch);
    }
}

impl<PS, PA, S, A> StoreCore<S, A> for ChildCore<PS, PA, S, A>
where
    PS: 'static,
    PA: 'static,
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fn id(&self) -> u64 {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    fn scheduler(&self) -> &Scheduler {
        self.parent.scheduler()
    }

    fn scopes(&self) -> &ScopeCache {
        &self.scopes
    }

    fn read(&self, visit: &mut dyn FnMut(&S)) {
        match &self.state {
            StateLens::Key(path) => self
                .parent
                .read(&mut |parent: &PS| path.with(parent, |state: &S| visit(state))),
            StateLens::Case { path, last } => self.parent.read(&mut |parent: &PS| {
                match path.extract(parent) {
                    Some(state) => visit(state),
                    None => visit(&*last.load_full()),
                }
            }),
        }
    }

    fn dispatch(&self, action: A, mut lineage: Vec<u64>, group: &TaskGroup) {
        if !self.live.load(Ordering::Acquire) {
            tracing::warn!(
                store = self.id,
                label = %self.label,
                "action sent to a dismissed store was dropped"
            );
            return;
        }
        lineage.push(self.id);
        self.parent
            .dispatch(self.action.embed(action), lineage, group);
    }

    fn watch(&self, on_commit: Box<dyn Fn(&S) + Send + Sync>) -> Subscription {
        match &self.state {
            StateLens::Key(path) => {
                let path = path.clone();
                self.parent.watch(Box::new(move |parent: &PS| {
                    path.with(parent, |state: &S| on_commit(state))
                }))
            }
            StateLens::Case { path, .. } => {
                let path = path.clone();
                self.parent.watch(Box::new(move |parent: &PS| {
                    if let Some(state) = path.extract(parent) {
                        on_commit(state);
                    }
                }))
            }
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire) && self.parent.is_live()
    }
}

impl<PS, PA, S, A> Drop for ChildCore<PS, PA, S, A> {
    fn drop(&mut self) {
        self.runtime.record(EventKind::Deinit, self.id, &self.label);
        self.parent.scheduler().cancel_owner(self.id);
    }
}

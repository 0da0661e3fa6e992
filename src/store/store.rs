use super::cache::ScopeKey;
use super::node::{ChildCore, RootCore, StoreCore};
use super::reducer::Reducer;
use super::task::{Task, TaskGroup};
use crate::effect::{Scheduler, SchedulerConfig};
use crate::path::{CasePath, KeyPath};
use crate::reference::Subscription;
use crate::runtime::{short_type_name, EventKind, Runtime};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A runtime for one feature: state, a reducer, and the effects it starts.
///
/// A root store owns its state and processes actions one at a time, in the
/// order they arrive. A store derived with [`scope`](Store::scope) or
/// [`scope_case`](Store::scope_case) owns nothing: it reads through to its
/// parent's state and forwards actions to the parent.
///
/// Cloning a store clones a handle; every clone is the same store.
///
/// # Examples
///
/// ```
/// use statebox::{Effect, Store};
///
/// #[derive(Clone, Debug, Default)]
/// struct Counter { count: i32 }
///
/// enum Action { Increment, Decrement }
///
/// let store = Store::new(Counter::default(), |state: &mut Counter, action: Action| {
///     match action {
///         Action::Increment => state.count += 1,
///         Action::Decrement => state.count -= 1,
///     }
///     Effect::none()
/// });
///
/// store.send(Action::Increment).wait();
/// store.send(Action::Increment).wait();
/// store.send(Action::Decrement).wait();
/// assert_eq!(store.state().count, 1);
/// ```
pub struct Store<S, A> {
    core: Arc<dyn StoreCore<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// A root store on the current [`Runtime`] with default scheduler settings.
    pub fn new(initial: S, reducer: impl Reducer<S, A>) -> Self {
        Self::builder(initial, reducer).build()
    }

    pub fn builder(initial: S, reducer: impl Reducer<S, A>) -> StoreBuilder<S, A> {
        StoreBuilder {
            initial,
            reducer: Box::new(reducer),
            runtime: None,
            scheduler: SchedulerConfig::default(),
        }
    }

    /// Queue `action` and, unless another call is already doing so, process the queue.
    ///
    /// Actions sent while a reduce is running, from a reducer, an observer or
    /// another thread, are processed after it in arrival order. State changes
    /// are visible once the action's reduce has returned.
    pub fn send(&self, action: A) -> Task {
        let group = TaskGroup::new();
        self.core.dispatch(action, Vec::new(), &group);
        Task::new(group)
    }

    /// A copy of the last committed state.
    pub fn state(&self) -> S {
        self.with_state(S::clone)
    }

    /// Borrow the last committed state.
    pub fn with_state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        let mut f = Some(f);
        let mut out = None;
        self.core.read(&mut |state: &S| {
            if let Some(f) = f.take() {
                out = Some(f(state));
            }
        });
        out.unwrap_or_else(|| unreachable!("store `{}` skipped its visitor", self.core.label()))
    }

    /// Call `on_commit` with the state after every reduce.
    ///
    /// Derived stores call it only while their state is present in the parent.
    pub fn subscribe(&self, on_commit: impl Fn(&S) + Send + Sync + 'static) -> Subscription {
        self.core.watch(Box::new(on_commit))
    }

    /// Call `on_change` after each reduce that changes the value at `path`.
    pub fn observe<V>(
        &self,
        path: KeyPath<S, V>,
        on_change: impl Fn(&V) + Send + Sync + 'static,
    ) -> Subscription
    where
        V: Clone + PartialEq + Send + 'static,
    {
        let last = Mutex::new(self.with_state(|state| path.get(state)));
        self.core.watch(Box::new(move |state: &S| {
            path.with(state, |value: &V| {
                {
                    let mut last = last.lock();
                    if *last == *value {
                        return;
                    }
                    *last = value.clone();
                }
                on_change(value);
            })
        }))
    }

    /// A store over the part of this store's state `state` reaches, sending actions
    /// through the `action` case.
    ///
    /// Scoping the same paths again returns the same store while it is alive.
    pub fn scope<CS, CA>(&self, state: KeyPath<S, CS>, action: CasePath<A, CA>) -> Store<CS, CA>
    where
        CS: Clone + Send + Sync + 'static,
        CA: Send + 'static,
    {
        self.record_scope();
        let key = ScopeKey::new(state.id(), action.id());
        let parent = Arc::clone(&self.core);
        let (core, _) = self.core.scopes().get_or_insert_with(key, move || {
            let core: Arc<dyn StoreCore<CS, CA>> =
                ChildCore::keyed(parent, state, action, short_type_name::<Store<CS, CA>>());
            core
        });
        Store { core }
    }

    /// A store over one case of this store's state, or `None` when the state is
    /// in another case.
    ///
    /// The store is invalidated as soon as this store commits a state outside
    /// the case: its effects are cancelled and actions sent to it are dropped.
    /// Scoping again after the case returns yields a new store.
    pub fn scope_case<CS, CA>(
        &self,
        state: CasePath<S, CS>,
        action: CasePath<A, CA>,
    ) -> Option<Store<CS, CA>>
    where
        CS: Clone + Send + Sync + 'static,
        CA: Send + 'static,
    {
        self.record_scope();
        let initial = self.with_state(|parent| state.extract(parent).cloned())?;
        let key = ScopeKey::new(state.id(), action.id());
        let parent = Arc::clone(&self.core);
        let (core, _) = self.core.scopes().get_or_insert_with(key, move || {
            let core: Arc<dyn StoreCore<CS, CA>> = ChildCore::cased(
                parent,
                state,
                action,
                initial,
                short_type_name::<Store<CS, CA>>(),
            );
            core
        });
        Some(Store { core })
    }

    fn record_scope(&self) {
        self.core
            .runtime()
            .record(EventKind::Scope, self.core.id(), self.core.label());
    }

    /// Cancel every running effect started through this store or the stores derived from it.
    pub fn cancel_effects(&self) -> usize {
        self.core.scheduler().cancel_owner(self.core.id())
    }

    /// Effects of the whole store tree that are still running.
    pub fn effects_in_flight(&self) -> usize {
        self.core.scheduler().in_flight()
    }

    /// Number of derived stores currently alive under this store.
    pub fn scoped_children(&self) -> usize {
        self.core.scopes().len()
    }

    /// False once a store from [`scope_case`](Store::scope_case) (or one derived
    /// from it) has been invalidated.
    pub fn is_live(&self) -> bool {
        self.core.is_live()
    }

    pub fn id(&self) -> u64 {
        self.core.id()
    }

    pub fn label(&self) -> &str {
        self.core.label()
    }

    pub fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(self.core.runtime())
    }
}

impl<S, A> Store<S, A> {
    /// True when both handles are the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.core), Arc::as_ptr(&other.core))
    }
}

impl<S, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.core.id())
            .field("label", &self.core.label())
            .finish()
    }
}

/// Configures a root [`Store`].
///
/// ```
/// use statebox::{Effect, Store};
/// use statebox::runtime::Runtime;
///
/// let runtime = Runtime::new();
/// let store = Store::builder(0u32, |n: &mut u32, _: ()| { *n += 1; Effect::none() })
///     .runtime(runtime.clone())
///     .thread_name("counter-fx")
///     .build();
/// store.send(()).wait();
/// assert_eq!(store.state(), 1);
/// ```
pub struct StoreBuilder<S, A> {
    initial: S,
    reducer: Box<dyn Reducer<S, A>>,
    runtime: Option<Arc<Runtime>>,
    scheduler: SchedulerConfig,
}

impl<S, A> StoreBuilder<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Runtime used for ids and lifecycle events. Defaults to [`Runtime::current`].
    pub fn runtime(mut self, runtime: Arc<Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.scheduler.thread_name = name.into();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.scheduler.stack_size = Some(bytes);
        self
    }

    pub fn build(self) -> Store<S, A> {
        let runtime = self.runtime.unwrap_or_else(Runtime::current);
        let core: Arc<dyn StoreCore<S, A>> = RootCore::new(
            self.initial,
            self.reducer,
            runtime,
            Scheduler::new(self.scheduler),
            short_type_name::<Store<S, A>>(),
        );
        Store { core }
    }
}

impl<S, A> fmt::Debug for StoreBuilder<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;
    use crate::{case_path, key_path};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Counter {
        count: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum CounterAction {
        Increment,
        Add(i32),
        Delayed(i32),
    }

    fn counter(state: &mut Counter, action: CounterAction) -> Effect<CounterAction> {
        match action {
            CounterAction::Increment => state.count += 1,
            CounterAction::Add(n) => state.count += n,
            CounterAction::Delayed(n) => {
                return Effect::run(move |emitter| {
                    emitter.emit(CounterAction::Add(n));
                })
            }
        }
        Effect::none()
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct App {
        counter: Counter,
        other: Counter,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum AppAction {
        Counter(CounterAction),
        Other(CounterAction),
    }

    fn app() -> impl Reducer<App, AppAction> {
        crate::store::combine(
            crate::store::scope(
                key_path!(App => counter),
                case_path!(AppAction::Counter),
                counter,
            ),
            crate::store::scope(key_path!(App => other), case_path!(AppAction::Other), counter),
        )
    }

    #[test]
    fn send_reduces_in_order() {
        let store = Store::new(Counter::default(), counter);
        store.send(CounterAction::Add(2)).wait();
        store.send(CounterAction::Increment).wait();
        assert_eq!(store.state().count, 3);
    }

    #[test]
    fn sends_from_observers_are_buffered() {
        let store = Store::new(Counter::default(), counter);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let resend = store.clone();
        let _sub = store.subscribe(move |state: &Counter| {
            log.lock().push(state.count);
            if state.count == 1 {
                let _ = resend.send(CounterAction::Add(10));
            }
        });
        store.send(CounterAction::Increment).wait();
        assert_eq!(*seen.lock(), vec![1, 11]);
    }

    #[test]
    fn effects_feed_actions_back() {
        let store = Store::new(Counter::default(), counter);
        let task = store.send(CounterAction::Delayed(5));
        assert!(task.wait_timeout(Duration::from_secs(5)));
        assert_eq!(store.state().count, 5);
        assert_eq!(store.effects_in_flight(), 0);
    }

    #[test]
    fn scoped_store_reads_and_forwards() {
        let store = Store::new(App::default(), app());
        let child = store.scope(key_path!(App => counter), case_path!(AppAction::Counter));
        child.send(CounterAction::Add(4)).wait();
        assert_eq!(child.state().count, 4);
        assert_eq!(store.state().counter.count, 4);
        assert_eq!(store.state().other.count, 0);
    }

    #[test]
    fn scope_is_cached_while_alive() {
        let store = Store::new(App::default(), app());
        let a = store.scope(key_path!(App => counter), case_path!(AppAction::Counter));
        let b = store.scope(key_path!(App => counter), case_path!(AppAction::Counter));
        let other = store.scope(key_path!(App => other), case_path!(AppAction::Other));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&other));
        assert_eq!(store.scoped_children(), 2);

        let id = a.id();
        drop(a);
        drop(b);
        let c = store.scope(key_path!(App => counter), case_path!(AppAction::Counter));
        assert_ne!(c.id(), id);
    }

    #[test]
    fn observe_fires_only_on_change() {
        let store = Store::new(App::default(), app());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = store.observe(key_path!(App => other.count), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        store.send(AppAction::Counter(CounterAction::Increment)).wait();
        store.send(AppAction::Other(CounterAction::Increment)).wait();
        store.send(AppAction::Counter(CounterAction::Increment)).wait();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn builder_configures_runtime() {
        let runtime = Runtime::new();
        runtime.set_recording(true);
        let store = Store::builder(Counter::default(), counter)
            .runtime(runtime.clone())
            .build();
        assert!(Arc::ptr_eq(&store.runtime(), &runtime));
        assert_eq!(runtime.count(EventKind::Init, "Store<Counter, CounterAction>"), 1);
        drop(store);
        assert_eq!(runtime.count(EventKind::Deinit, ""), 1);
    }

    #[test]
    fn store_keeps_working_after_a_reducer_panic() {
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let go = Mutex::new(Some(go_rx));
        let store = Store::new(0i32, move |n: &mut i32, delta: i32| -> Effect<i32> {
            match delta {
                0 => {
                    let go = go.lock().take();
                    return Effect::run(move |emitter| {
                        if let Some(go) = go {
                            let _ = go.recv();
                        }
                        emitter.emit(-1);
                    });
                }
                -1 => panic!("reducer failed"),
                delta => *n += delta,
            }
            Effect::none()
        });

        // The emitted action panics on the worker thread that drains it.
        let task = store.send(0);
        go_tx.send(()).unwrap();
        assert!(task.wait_timeout(Duration::from_secs(5)));

        let direct = panic::catch_unwind(AssertUnwindSafe(|| store.send(-1).wait()));
        assert!(direct.is_err());

        store.send(2).wait();
        store.send(3).wait();
        assert_eq!(store.state(), 5);
    }

    #[test]
    fn dropping_the_store_while_work_emits_releases_the_worker() {
        for attempt in 0..40u64 {
            let (done_tx, done_rx) = mpsc::channel::<()>();
            let done = Mutex::new(Some(done_tx));
            let store = Store::new(0u64, move |n: &mut u64, start: bool| -> Effect<bool> {
                *n += 1;
                match done.lock().take().filter(|_| start) {
                    Some(done) => Effect::run(move |emitter| {
                        while emitter.emit(false) {}
                        let _ = done.send(());
                    }),
                    None => Effect::none(),
                }
            });

            let _ = store.send(true);
            thread::sleep(Duration::from_micros(100 + attempt * 15));
            drop(store);
            assert!(
                done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
                "worker stuck after attempt {attempt}"
            );
        }
    }
}

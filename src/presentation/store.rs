use super::state::{PresentationAction, PresentationId, PresentationState};
use crate::path::{CasePath, KeyPath};
use crate::reference::Subscription;
use crate::store::{Store, Task};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type Current<S, A> = Arc<Mutex<Option<(PresentationId, Store<S, A>)>>>;

/// A store over a [`PresentationState`] that hands out the presented child.
///
/// Every presentation gets its own child store. The child handed out by
/// [`scope`](PresentationStore::scope) stays the same for as long as the
/// presentation lasts and goes dead as soon as it ends, even if the next
/// presentation holds an equal state.
pub struct PresentationStore<S, A> {
    store: Store<PresentationState<S>, PresentationAction<A>>,
    current: Current<S, A>,
    _watch: Subscription,
}

impl<S, A> PresentationStore<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    pub fn new(store: Store<PresentationState<S>, PresentationAction<A>>) -> Self {
        let current: Current<S, A> = Arc::new(Mutex::new(None));
        let slot = Arc::downgrade(&current);
        let watch = store.subscribe(move |presentation: &PresentationState<S>| {
            let Some(slot) = slot.upgrade() else {
                return;
            };
            let ended = {
                let mut current = slot.lock();
                match current.as_ref() {
                    Some((id, _)) if presentation.id() != Some(*id) => current.take(),
                    _ => None,
                }
            };
            drop(ended);
        });
        Self {
            store,
            current,
            _watch: watch,
        }
    }

    /// The child store of the current presentation, if anything is presented.
    pub fn scope(&self) -> Option<Store<S, A>> {
        let Some(id) = self.presentation_id() else {
            tracing::trace!(label = self.store.label(), "scope with nothing presented");
            return None;
        };
        let child = self.store.scope_case(
            PresentationState::case(id),
            PresentationAction::presented_case(),
        )?;
        let replaced = {
            let mut current = self.current.lock();
            match current.as_ref() {
                Some((_, held)) if held.ptr_eq(&child) => None,
                _ => current.replace((id, child.clone())),
            }
        };
        drop(replaced);
        Some(child)
    }

    pub fn send(&self, action: PresentationAction<A>) -> Task {
        self.store.send(action)
    }

    /// Send `Dismiss`, ending the presentation.
    pub fn dismiss(&self) -> Task {
        self.store.send(PresentationAction::Dismiss)
    }

    pub fn is_presented(&self) -> bool {
        self.store.with_state(PresentationState::is_presented)
    }

    pub fn presentation_id(&self) -> Option<PresentationId> {
        self.store.with_state(PresentationState::id)
    }

    /// The presented state, if any.
    pub fn state(&self) -> Option<S> {
        self.store.with_state(|presentation| presentation.as_ref().cloned())
    }

    /// The underlying store over the whole presentation state.
    pub fn store(&self) -> &Store<PresentationState<S>, PresentationAction<A>> {
        &self.store
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// A [`PresentationStore`] for the presentation `state` reaches, driven by the `action` case.
    pub fn scope_presentation<CS, CA>(
        &self,
        state: KeyPath<S, PresentationState<CS>>,
        action: CasePath<A, PresentationAction<CA>>,
    ) -> PresentationStore<CS, CA>
    where
        CS: Clone + Send + Sync + 'static,
        CA: Send + 'static,
    {
        PresentationStore::new(self.scope(state, action))
    }
}

impl<S, A> fmt::Debug for PresentationStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentationStore")
            .field("store", &self.store)
            .field("current", &self.current.lock().as_ref().map(|(id, _)| *id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;
    use crate::presentation::presents;
    use crate::runtime::{EventKind, Runtime};
    use crate::{case_path, key_path};
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Parent {
        sheet: PresentationState<i32>,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum ParentAction {
        Open(i32),
        Sheet(PresentationAction<SheetAction>),
    }

    #[derive(Clone, Debug, PartialEq)]
    enum SheetAction {
        Add(i32),
        Watch,
        Tick,
    }

    fn sheet(state: &mut i32, action: SheetAction) -> Effect<SheetAction> {
        match action {
            SheetAction::Add(n) => *state += n,
            SheetAction::Tick => *state += 100,
            SheetAction::Watch => {
                return Effect::run(|emitter| {
                    while emitter.sleep(Duration::from_millis(5)) {
                        emitter.emit(SheetAction::Tick);
                    }
                })
            }
        }
        Effect::none()
    }

    fn parent_store(runtime: Arc<Runtime>) -> Store<Parent, ParentAction> {
        let reducer = presents(
            |state: &mut Parent, action: ParentAction| {
                if let ParentAction::Open(value) = action {
                    state.sheet.present(value);
                }
                Effect::none()
            },
            key_path!(Parent => sheet),
            case_path!(ParentAction::Sheet),
            sheet,
        );
        Store::builder(Parent::default(), reducer)
            .runtime(runtime)
            .build()
    }

    fn presentation(
        store: &Store<Parent, ParentAction>,
    ) -> PresentationStore<i32, SheetAction> {
        store.scope_presentation(key_path!(Parent => sheet), case_path!(ParentAction::Sheet))
    }

    #[test]
    fn scope_is_none_until_presented() {
        let store = parent_store(Runtime::new());
        let sheet = presentation(&store);
        assert!(sheet.scope().is_none());

        store.send(ParentAction::Open(1)).wait();
        let child = sheet.scope().unwrap();
        child.send(SheetAction::Add(2)).wait();
        assert_eq!(sheet.state(), Some(3));
        assert!(child.ptr_eq(&sheet.scope().unwrap()));
    }

    #[test]
    fn each_presentation_gets_a_new_child() {
        let store = parent_store(Runtime::new());
        let sheet = presentation(&store);
        store.send(ParentAction::Open(1)).wait();
        let first = sheet.scope().unwrap();

        store.send(ParentAction::Open(1)).wait();
        assert!(!first.is_live());
        let second = sheet.scope().unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(second.state(), 1);
    }

    #[test]
    fn dismiss_releases_the_child() {
        let runtime = Runtime::new();
        runtime.set_recording(true);
        let store = parent_store(Arc::clone(&runtime));
        let sheet = presentation(&store);
        store.send(ParentAction::Open(1)).wait();
        drop(sheet.scope());
        runtime.clear();

        sheet.dismiss().wait();
        assert!(!sheet.is_presented());
        assert!(sheet.scope().is_none());
        assert_eq!(runtime.count(EventKind::Deinit, "Store<i32, SheetAction>"), 1);
    }

    #[test]
    fn dismissal_cancels_running_child_effects() {
        let store = parent_store(Runtime::new());
        let sheet = presentation(&store);
        store.send(ParentAction::Open(0)).wait();
        let child = sheet.scope().unwrap();
        let _running = child.send(SheetAction::Watch);

        let (tx, rx) = mpsc::channel();
        let _sub = child.subscribe(move |count: &i32| {
            let _ = tx.send(*count);
        });
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        sheet.dismiss().wait();
        assert_eq!(store.effects_in_flight(), 0);
        assert!(!child.is_live());
    }
}

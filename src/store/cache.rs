use super::node::StoreCore;
use crate::path::PathId;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Identity of a derived store under one parent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ScopeKey {
    state: PathId,
    action: PathId,
}

impl ScopeKey {
    pub(crate) fn new(state: &PathId, action: &PathId) -> Self {
        Self {
            state: state.clone(),
            action: action.clone(),
        }
    }
}

struct Entry {
    /// A `Weak<dyn StoreCore<S, A>>` for the child's domain.
    store: Box<dyn Any + Send + Sync>,
    live: Box<dyn Fn() -> bool + Send + Sync>,
}

/// Children derived from one store, held weakly.
///
/// A cached child is handed out again while someone holds it and it has not
/// been invalidated. Dead and invalidated entries are treated as missing and
/// pruned on the next insert.
#[derive(Default)]
pub(crate) struct ScopeCache {
    entries: Mutex<HashMap<ScopeKey, Entry>>,
}

impl ScopeCache {
    /// The live child for `key`, or a new one from `create`.
    ///
    /// Returns the child and whether it was created.
    pub(crate) fn get_or_insert_with<S, A>(
        &self,
        key: ScopeKey,
        create: impl FnOnce() -> Arc<dyn StoreCore<S, A>>,
    ) -> (Arc<dyn StoreCore<S, A>>, bool)
    where
        S: 'static,
        A: 'static,
    {
        let mut entries = self.entries.lock();
        let cached = entries
            .get(&key)
            .and_then(|entry| entry.store.downcast_ref::<Weak<dyn StoreCore<S, A>>>())
            .and_then(Weak::upgrade)
            .filter(|core| core.is_live());
        if let Some(core) = cached {
            return (core, false);
        }

        entries.retain(|_, entry| (entry.live)());
        let core = create();
        let weak = Arc::downgrade(&core);
        let probe = weak.clone();
        entries.insert(
            key,
            Entry {
                store: Box::new(weak),
                live: Box::new(move || probe.upgrade().is_some_and(|core| core.is_live())),
            },
        );
        (core, true)
    }

    /// Number of live children.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| (entry.live)())
            .count()
    }
}

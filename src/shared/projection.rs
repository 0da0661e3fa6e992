use crate::path::{KeyPath, PathId};
use crate::reference::{Reference, ReferenceId, Subscription};
use parking_lot::Mutex;
use std::sync::Arc;

/// A reference seen through a path, with the root value type erased.
pub(crate) trait Projection<V>: Send + Sync {
    fn reference_id(&self) -> ReferenceId;

    fn path_id(&self) -> PathId;

    /// Visit the projected part of the last committed value.
    fn read(&self, visit: &mut dyn FnMut(&V));

    fn write(&self, mutate: &mut dyn FnMut(&mut V));

    /// Called with the projected part of every committed root value.
    fn subscribe(&self, on_commit: Box<dyn Fn(&V) + Send + Sync>) -> Subscription;
}

pub(crate) struct Bound<R, V> {
    reference: Arc<dyn Reference<R>>,
    path: KeyPath<R, V>,
}

impl<R: 'static, V: 'static> Bound<R, V> {
    pub(crate) fn new(reference: Arc<dyn Reference<R>>, path: KeyPath<R, V>) -> Self {
        Self { reference, path }
    }
}

impl<R: 'static, V: 'static> Projection<V> for Bound<R, V> {
    fn reference_id(&self) -> ReferenceId {
        self.reference.id()
    }

    fn path_id(&self) -> PathId {
        self.path.id().clone()
    }

    fn read(&self, visit: &mut dyn FnMut(&V)) {
        let root = self.reference.load();
        self.path.with(&root, |value: &V| visit(value));
    }

    fn write(&self, mutate: &mut dyn FnMut(&mut V)) {
        let path = &self.path;
        self.reference
            .update(&mut |root: &mut R| path.with_mut(root, |value: &mut V| mutate(value)));
    }

    fn subscribe(&self, on_commit: Box<dyn Fn(&V) + Send + Sync>) -> Subscription {
        let path = self.path.clone();
        self.reference.subscribe(Box::new(move |root: &R| {
            path.with(root, |value: &V| on_commit(value))
        }))
    }
}

/// A projection of another projection.
pub(crate) struct Chained<P, V> {
    parent: Arc<dyn Projection<P>>,
    path: KeyPath<P, V>,
}

impl<P: 'static, V: 'static> Chained<P, V> {
    pub(crate) fn new(parent: Arc<dyn Projection<P>>, path: KeyPath<P, V>) -> Self {
        Self { parent, path }
    }
}

impl<P: 'static, V: 'static> Projection<V> for Chained<P, V> {
    fn reference_id(&self) -> ReferenceId {
        self.parent.reference_id()
    }

    fn path_id(&self) -> PathId {
        self.parent.path_id().append(self.path.id())
    }

    fn read(&self, visit: &mut dyn FnMut(&V)) {
        let path = &self.path;
        self.parent
            .read(&mut |parent: &P| path.with(parent, |value: &V| visit(value)));
    }

    fn write(&self, mutate: &mut dyn FnMut(&mut V)) {
        let path = &self.path;
        self.parent
            .write(&mut |parent: &mut P| path.with_mut(parent, |value: &mut V| mutate(value)));
    }

    fn subscribe(&self, on_commit: Box<dyn Fn(&V) + Send + Sync>) -> Subscription {
        let path = self.path.clone();
        self.parent.subscribe(Box::new(move |parent: &P| {
            path.with(parent, |value: &V| on_commit(value))
        }))
    }
}

/// Read the projected value through `f`.
pub(crate) fn with<V, T>(projection: &dyn Projection<V>, f: impl FnOnce(&V) -> T) -> T {
    let mut f = Some(f);
    let mut out = None;
    projection.read(&mut |value: &V| {
        if let Some(f) = f.take() {
            out = Some(f(value));
        }
    });
    out.unwrap_or_else(|| unreachable!("projection `{}` skipped its visitor", projection.path_id()))
}

/// Subscribe `on_change` to commits that change the projected value.
pub(crate) fn subscribe_distinct<V>(
    projection: &dyn Projection<V>,
    on_change: impl Fn(&V) + Send + Sync + 'static,
) -> Subscription
where
    V: Clone + PartialEq + Send + 'static,
{
    let last = Mutex::new(with(projection, V::clone));
    projection.subscribe(Box::new(move |value: &V| {
        {
            let mut last = last.lock();
            if *last == *value {
                return;
            }
            *last = value.clone();
        }
        on_change(value);
    }))
}

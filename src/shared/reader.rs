use super::projection::{self, Chained, Projection};
use crate::path::{KeyPath, PathId};
use crate::reference::{InMemoryReference, Reference, ReferenceId, Subscription};
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A read-only handle to a value owned by a [`Reference`].
///
/// Obtained from [`Shared::reader`](super::Shared::reader) or bound directly
/// to a reference. Observes every write made through read-write handles.
///
/// # Examples
///
/// ```
/// use statebox::Shared;
///
/// let count = Shared::new(1);
/// let reader = count.reader();
/// count.set(2);
/// assert_eq!(reader.get(), 2);
/// ```
pub struct SharedReader<V> {
    pub(super) projection: Arc<dyn Projection<V>>,
}

impl<V> Clone for SharedReader<V> {
    fn clone(&self) -> Self {
        Self {
            projection: Arc::clone(&self.projection),
        }
    }
}

impl<V: Send + Sync + 'static> SharedReader<V> {
    /// A reader over a value nobody else can write.
    pub fn constant(value: V) -> Self
    where
        V: Clone + PartialEq,
    {
        Self::from_reference(InMemoryReference::new(value))
    }

    pub fn from_reference<R>(reference: Arc<R>) -> Self
    where
        R: Reference<V>,
    {
        let reference: Arc<dyn Reference<V>> = reference;
        Self {
            projection: Arc::new(super::projection::Bound::new(reference, KeyPath::identity())),
        }
    }

    pub fn get(&self) -> V
    where
        V: Clone,
    {
        self.with(V::clone)
    }

    pub fn with<T>(&self, f: impl FnOnce(&V) -> T) -> T {
        projection::with(self.projection.as_ref(), f)
    }

    pub fn project<M: Send + Sync + 'static>(&self, path: KeyPath<V, M>) -> SharedReader<M> {
        SharedReader {
            projection: Arc::new(Chained::new(Arc::clone(&self.projection), path)),
        }
    }

    /// See [`Shared::project_optional`](super::Shared::project_optional).
    pub fn project_optional<M>(&self, path: KeyPath<V, Option<M>>) -> Option<SharedReader<M>>
    where
        M: Clone + Send + Sync + 'static,
    {
        let current = self.with(|value| path.with(value, Option::clone))?;
        Some(self.project(path.unwrap_or(current)))
    }

    pub fn subscribe(&self, on_change: impl Fn(&V) + Send + Sync + 'static) -> Subscription
    where
        V: Clone + PartialEq,
    {
        projection::subscribe_distinct(self.projection.as_ref(), on_change)
    }

    pub fn reference_id(&self) -> ReferenceId {
        self.projection.reference_id()
    }

    pub fn path_id(&self) -> PathId {
        self.projection.path_id()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.reference_id() == other.reference_id() && self.path_id() == other.path_id()
    }
}

impl<V: PartialEq + Send + Sync + 'static> PartialEq for SharedReader<V> {
    fn eq(&self, other: &Self) -> bool {
        self.with(|a| other.with(|b| a == b))
    }
}

impl<V: Eq + Send + Sync + 'static> Eq for SharedReader<V> {}

impl<V: Hash + Send + Sync + 'static> Hash for SharedReader<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.with(|value| value.hash(state));
    }
}

impl<V: fmt::Debug + Send + Sync + 'static> fmt::Debug for SharedReader<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| f.debug_tuple("SharedReader").field(value).finish())
    }
}

impl<V: Serialize + Send + Sync + 'static> Serialize for SharedReader<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.with(|value| value.serialize(serializer))
    }
}

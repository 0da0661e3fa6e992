use super::projection::{self, Bound, Chained, Projection};
use super::SharedReader;
use crate::error::ReferenceError;
use crate::path::{KeyPath, PathId};
use crate::reference::{
    InMemoryReference, Persistable, Persistence, Reference, ReferenceId, Subscription,
};
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A read-write handle to a value owned by a [`Reference`].
///
/// Handles are cheap to clone and to [`project`](Shared::project): every
/// clone and projection reads and writes the same underlying value.
///
/// Equality, hashing, `Debug` and `Serialize` all use the current value.
/// Two handles over different references that hold equal values are equal;
/// use [`ptr_eq`](Shared::ptr_eq) to compare identity.
///
/// # Examples
///
/// ```
/// use statebox::{key_path, Shared};
///
/// #[derive(Clone, Debug, Default, PartialEq)]
/// struct Settings { volume: u8 }
///
/// let settings = Shared::new(Settings::default());
/// let volume = settings.project(key_path!(Settings => volume));
/// volume.set(7);
/// assert_eq!(settings.get().volume, 7);
/// ```
pub struct Shared<V> {
    pub(super) projection: Arc<dyn Projection<V>>,
}

impl<V> Clone for Shared<V> {
    fn clone(&self) -> Self {
        Self {
            projection: Arc::clone(&self.projection),
        }
    }
}

impl<V: Send + Sync + 'static> Shared<V> {
    /// A handle to a fresh in-memory reference holding `value`.
    pub fn new(value: V) -> Self
    where
        V: Clone + PartialEq,
    {
        Self::from_reference(InMemoryReference::new(value))
    }

    /// A handle to the whole value of `reference`.
    pub fn from_reference<R>(reference: Arc<R>) -> Self
    where
        R: Reference<V>,
    {
        let reference: Arc<dyn Reference<V>> = reference;
        Self::bind(reference, KeyPath::identity())
    }

    /// A handle to the part of `reference` that `path` reaches.
    pub fn bind<Root: 'static>(
        reference: Arc<dyn Reference<Root>>,
        path: KeyPath<Root, V>,
    ) -> Self {
        Self {
            projection: Arc::new(Bound::new(reference, path)),
        }
    }

    /// A handle to the persisted value stored under `key`.
    pub fn persisted(
        persistence: &Persistence,
        key: &str,
        default: V,
    ) -> Result<Self, ReferenceError>
    where
        V: Persistable,
    {
        Ok(Self::from_reference(persistence.reference(key, default)?))
    }

    /// The current value.
    pub fn get(&self) -> V
    where
        V: Clone,
    {
        self.with(V::clone)
    }

    /// Borrow the current value.
    pub fn with<T>(&self, f: impl FnOnce(&V) -> T) -> T {
        projection::with(self.projection.as_ref(), f)
    }

    pub fn set(&self, value: V) {
        let mut value = Some(value);
        self.projection.write(&mut |slot: &mut V| {
            if let Some(value) = value.take() {
                *slot = value;
            }
        });
    }

    /// Mutate the value in place. The change is visible to every handle when this returns.
    pub fn update(&self, mut f: impl FnMut(&mut V)) {
        self.projection.write(&mut f);
    }

    /// A handle to part of this value, bound to the same reference.
    pub fn project<M: Send + Sync + 'static>(&self, path: KeyPath<V, M>) -> Shared<M> {
        Shared {
            projection: Arc::new(Chained::new(Arc::clone(&self.projection), path)),
        }
    }

    /// A handle to the wrapped value of an optional member, or `None` while it is unset.
    ///
    /// The handle keeps working if the member is cleared later: it reads the
    /// value seen at projection time and writing through it sets the member again.
    pub fn project_optional<M>(&self, path: KeyPath<V, Option<M>>) -> Option<Shared<M>>
    where
        M: Clone + Send + Sync + 'static,
    {
        let current = self.with(|value| path.with(value, Option::clone))?;
        Some(self.project(path.unwrap_or(current)))
    }

    /// Call `on_change` after every commit that changes this handle's value.
    pub fn subscribe(&self, on_change: impl Fn(&V) + Send + Sync + 'static) -> Subscription
    where
        V: Clone + PartialEq,
    {
        projection::subscribe_distinct(self.projection.as_ref(), on_change)
    }

    /// A read-only handle to the same value.
    pub fn reader(&self) -> SharedReader<V> {
        SharedReader {
            projection: Arc::clone(&self.projection),
        }
    }

    pub fn reference_id(&self) -> ReferenceId {
        self.projection.reference_id()
    }

    pub fn path_id(&self) -> PathId {
        self.projection.path_id()
    }

    /// True when both handles address the same part of the same reference.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.reference_id() == other.reference_id() && self.path_id() == other.path_id()
    }
}

impl<V: PartialEq + Send + Sync + 'static> PartialEq for Shared<V> {
    fn eq(&self, other: &Self) -> bool {
        self.with(|a| other.with(|b| a == b))
    }
}

impl<V: Eq + Send + Sync + 'static> Eq for Shared<V> {}

impl<V: Hash + Send + Sync + 'static> Hash for Shared<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.with(|value| value.hash(state));
    }
}

impl<V: fmt::Debug + Send + Sync + 'static> fmt::Debug for Shared<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| f.debug_tuple("Shared").field(value).finish())
    }
}

impl<V: Serialize + Send + Sync + 'static> Serialize for Shared<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.with(|value| value.serialize(serializer))
    }
}

impl<V: Send + Sync + 'static> From<Shared<V>> for SharedReader<V> {
    fn from(shared: Shared<V>) -> Self {
        SharedReader {
            projection: shared.projection,
        }
    }
}

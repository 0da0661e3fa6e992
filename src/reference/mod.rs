//! Mutable values with identity and change notification.
//!
//! A [`Reference`] owns one value. [`Shared`](crate::Shared) handles and
//! stores read and write through it, and observers are told about every
//! committed change.
//!
//! Two implementations ship with the crate:
//!
//! - [`InMemoryReference`] keeps the value in memory only.
//! - [`PersistedReference`] writes through to a [`PersistenceBackend`] and
//!   reloads when the backend reports an external change. Open them through a
//!   [`Persistence`] registry so each key has at most one live reference.

mod backend;
mod persisted;
#[allow(clippy::module_inception)]
mod reference;
mod subscription;

pub use backend::{FileBackend, MemoryBackend, PersistenceBackend};
pub use persisted::{ErrorSink, Persistable, PersistedReference, Persistence};
pub use reference::{InMemoryReference, Reference, ReferenceId};
pub use subscription::Subscription;

pub(crate) use subscription::Subscribers;

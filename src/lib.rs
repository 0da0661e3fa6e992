//! # Statebox
//!
//! Unidirectional state management for Rust.
//!
//! Application state lives in a single tree owned by a root [`Store`]. It
//! changes only when an action is sent, runs through a [`Reducer`], and is
//! published to readers once the reduce has returned. Work with side effects
//! is described as an [`Effect`] and runs on worker threads, feeding actions
//! back into the store.
//!
//! ## Stores and scoping
//!
//! - [`Store::scope`] derives a child store for one feature from a state
//!   [`KeyPath`] and an action [`CasePath`]. The child reads through to its
//!   parent and forwards its actions to it.
//! - [`Store::scope_case`] does the same for one case of an enum state and
//!   returns `None` when the parent is not in that case.
//! - [`Store::scope_presentation`] wraps an optional child in a
//!   [`PresentationStore`] whose effects are cancelled when it is dismissed.
//!
//! ## Shared values
//!
//! A [`Shared`] handle reads and writes a value held by a [`Reference`],
//! optionally narrowed through a key path. Every handle on the same reference
//! sees every write. References can be persisted through a
//! [`PersistenceBackend`](reference::PersistenceBackend).
//!
//! ```
//! use statebox::{key_path, Shared};
//!
//! #[derive(Clone, Debug, Default, PartialEq)]
//! struct Settings { volume: u8, muted: bool }
//!
//! let settings = Shared::new(Settings::default());
//! let volume = settings.project(key_path!(Settings => volume));
//! volume.set(7);
//! assert_eq!(settings.get().volume, 7);
//! ```

pub mod effect;
pub mod error;
pub mod path;
pub mod presentation;
pub mod reference;
pub mod runtime;
pub mod shared;
pub mod store;

// Re-export main types for convenience
pub use effect::{CancellationToken, Effect, Emitter};
pub use error::{LoadError, PersistenceError, ReferenceError, SaveError};
pub use path::{CasePath, KeyPath};
pub use presentation::{presents, PresentationAction, PresentationState, PresentationStore};
pub use reference::{InMemoryReference, Persistence, Reference, Subscription};
pub use runtime::Runtime;
pub use shared::{Shared, SharedReader};
pub use store::{Reducer, Store, Task};

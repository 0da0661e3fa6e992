//! Stores: single-writer state containers driven by actions.
//!
//! A root [`Store`] owns its state and a queue of actions. Each action runs
//! through the [`Reducer`], the new state is published to readers and
//! observers, and the returned effects are started. Child stores derived
//! with `scope` and `scope_case` are views into the root and are cached per
//! parent, so the same paths yield the same child while it is alive.

mod cache;
mod node;
mod reducer;
#[allow(clippy::module_inception)]
mod store;
mod task;

pub use reducer::{combine, reduce_fn, scope, Combine, Reducer, Scope};
pub use store::{Store, StoreBuilder};
pub use task::Task;

pub(crate) use task::TaskGroup;

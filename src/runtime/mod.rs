//! Runtime support for stores and shared references.
//!
//! This module provides identity allocation, the store lifecycle event log,
//! and scoped runtimes for isolating that log in tests.

mod context;

pub(crate) use context::short_type_name;
pub use context::{EventKind, Runtime, StoreEvent};

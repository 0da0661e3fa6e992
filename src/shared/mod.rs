//! Handles that observe and mutate a value owned by a reference.
//!
//! A handle is a reference plus a [`KeyPath`](crate::path::KeyPath). Handles
//! are narrowed with `project`, which composes paths without copying the
//! value, and notify subscribers only when their own part of the value
//! changes.

mod projection;
mod reader;
#[allow(clippy::module_inception)]
mod shared;

pub use reader::SharedReader;
pub use shared::Shared;

//! Optional child features: sheets, alerts, navigation destinations.
//!
//! A parent keeps the child's state in a [`PresentationState`] and forwards
//! its actions as [`PresentationAction`]s. The [`presents`] reducer runs the
//! child while it is presented and cancels its effects once it is not, and
//! [`PresentationStore`] hands out one child store per presentation.

mod reducer;
mod state;
mod store;

pub use reducer::{presents, Presents};
pub use state::{PresentationAction, PresentationId, PresentationState};
pub use store::PresentationStore;

//! Effects: work a reducer asks for, run by a [`Scheduler`].
//!
//! Reducers never perform side effects themselves. They return an
//! [`Effect`] describing the work; the store starts it after the state
//! change has committed and feeds the resulting actions back in emission
//! order. Cancellation is cooperative through [`CancellationToken`].

mod cancel;
#[allow(clippy::module_inception)]
mod effect;
mod scheduler;

pub use cancel::{CancelId, CancellationToken};
pub use effect::{Effect, Emitter};
pub use scheduler::{Scheduler, SchedulerConfig};

pub(crate) use effect::{Hold, Op, Sink};

use parking_lot::{Condvar, Mutex};
use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifier used to cancel running effects.
///
/// Built from any hashable value; the value's type is part of the id, so
/// `CancelId::new(1u8)` and `CancelId::new(1u16)` differ.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelId(u64);

impl CancelId {
    pub fn new<T: Hash + 'static>(value: T) -> Self {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        value.hash(&mut hasher);
        CancelId(hasher.finish())
    }
}

impl fmt::Debug for CancelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancelId({:016x})", self.0)
    }
}

struct TokenState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Cooperative cancellation flag shared between a scheduler and one effect.
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: Mutex::new(false),
                wake: Condvar::new(),
            }),
        }
    }

    /// Signal cancellation and wake every sleeper. Idempotent.
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /// Sleep for `duration` or until cancelled. Returns `false` when cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.state.cancelled.lock();
        while !*cancelled {
            if self
                .state
                .wake
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        !*cancelled
    }

    /// Run `f` unless cancelled, holding off cancellation until it returns.
    pub(crate) fn while_active(&self, f: impl FnOnce()) -> bool {
        let cancelled = self.state.cancelled.lock();
        if *cancelled {
            return false;
        }
        f();
        drop(cancelled);
        true
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn ids_include_the_type() {
        assert_eq!(CancelId::new("timer"), CancelId::new("timer"));
        assert_ne!(CancelId::new(1u8), CancelId::new(1u16));
        assert_ne!(CancelId::new("a"), CancelId::new("b"));
    }

    #[test]
    fn sleep_completes_without_cancel() {
        let token = CancellationToken::new();
        assert!(token.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn cancel_wakes_sleepers_early() {
        let token = CancellationToken::new();
        let sleeper = token.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(!handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn nothing_runs_after_cancel() {
        let token = CancellationToken::new();
        let mut ran = 0;
        assert!(token.while_active(|| ran += 1));
        token.cancel();
        assert!(!token.while_active(|| ran += 1));
        assert_eq!(ran, 1);
    }
}

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// RAII guard for a change callback.
///
/// Dropping the guard unsubscribes; the callback is guaranteed not to run
/// for commits that start after the drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that watches nothing.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Unsubscribe now. Same as dropping.
    pub fn cancel(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

type Callback<V> = dyn Fn(&V) + Send + Sync;

/// Observer list holding callbacks weakly; the owning [`Subscription`] keeps
/// each callback alive.
pub(crate) struct Subscribers<V: ?Sized> {
    next: AtomicU64,
    entries: Mutex<Vec<(u64, Weak<Callback<V>>)>>,
}

impl<V: ?Sized + 'static> Subscribers<V> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn insert(self: &Arc<Self>, callback: Box<Callback<V>>) -> Subscription {
        let callback: Arc<Callback<V>> = Arc::from(callback);
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, Arc::downgrade(&callback)));

        let registry = Arc::downgrade(self);
        Subscription::new(move || {
            drop(callback);
            if let Some(registry) = registry.upgrade() {
                registry.entries.lock().retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Call every live callback with `value`, in registration order.
    ///
    /// Callbacks run outside the list's lock, so they may subscribe or
    /// unsubscribe freely.
    pub(crate) fn notify(&self, value: &V) {
        let live: Vec<Arc<Callback<V>>> = {
            let mut entries = self.entries.lock();
            entries.retain(|(_, callback)| callback.strong_count() > 0);
            entries
                .iter()
                .filter_map(|(_, callback)| callback.upgrade())
                .collect()
        };
        for callback in live {
            callback(value);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|(_, callback)| callback.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn notify_reaches_live_callbacks_only() {
        let subscribers = Subscribers::<i32>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let kept = subscribers.insert(Box::new(move |v: &i32| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        }));
        let counter = hits.clone();
        let dropped = subscribers.insert(Box::new(move |_| {
            counter.fetch_add(100, Ordering::SeqCst);
        }));
        drop(dropped);

        subscribers.notify(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(subscribers.len(), 1);

        kept.cancel();
        subscribers.notify(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(subscribers.len(), 0);
    }

    #[test]
    fn callbacks_may_subscribe_during_notify() {
        let subscribers = Subscribers::<()>::new();
        let nested = Arc::new(Mutex::new(Vec::new()));
        let registry = subscribers.clone();
        let sink = nested.clone();
        let _outer = subscribers.insert(Box::new(move |_| {
            sink.lock().push(registry.insert(Box::new(|_| {})));
        }));
        subscribers.notify(&());
        assert_eq!(subscribers.len(), 2);
    }
}

use super::subscription::{Subscribers, Subscription};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a [`Reference`], unique for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceId(u64);

impl ReferenceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ReferenceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref#{}", self.0)
    }
}

/// A mutable value with identity and change notification.
///
/// A reference is the sole owner of its value. Every shared handle derived
/// from it reads and writes that one value.
///
/// Reads return the last committed value and never block on writers.
/// Subscribers run after a write has committed, outside of any lock the
/// write holds, and only when the new value differs from the old one. They
/// see committed values in commit order, one at a time.
pub trait Reference<V>: Send + Sync + 'static {
    fn id(&self) -> ReferenceId;

    /// The last committed value.
    fn load(&self) -> Arc<V>;

    /// Mutate the value in place and commit it.
    ///
    /// `mutate` must not write to this same reference.
    fn update(&self, mutate: &mut dyn FnMut(&mut V));

    /// Register `on_change` for every committed value that differs from the previous one.
    fn subscribe(&self, on_change: Box<dyn Fn(&V) + Send + Sync>) -> Subscription;

    /// Short description for debugging, such as the persisted key.
    fn describe(&self) -> String {
        self.id().to_string()
    }

    fn set(&self, value: V) {
        let mut value = Some(value);
        self.update(&mut |slot| {
            if let Some(value) = value.take() {
                *slot = value;
            }
        });
    }
}

/// Committed values waiting to be handed to subscribers, in commit order.
struct Delivery<V> {
    pending: VecDeque<Arc<V>>,
    delivering: bool,
}

/// Lets the next write deliver again if a subscriber panics.
struct DeliveryGuard<'a, V> {
    delivery: &'a Mutex<Delivery<V>>,
}

impl<V> Drop for DeliveryGuard<'_, V> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.delivery.lock().delivering = false;
        }
    }
}

/// The value cell behind every concrete reference.
///
/// Writers commit under one lock and queue the committed value. Whichever
/// writer finds nobody delivering hands queued values to subscribers until
/// the queue is empty, so subscribers see commits one at a time and in
/// commit order, even when the commits come from different threads.
pub(crate) struct Cell<V> {
    id: ReferenceId,
    value: ArcSwap<V>,
    write: Mutex<Delivery<V>>,
    subscribers: Arc<Subscribers<V>>,
}

impl<V> Cell<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new(value: V) -> Self {
        Self {
            id: ReferenceId::next(),
            value: ArcSwap::from_pointee(value),
            write: Mutex::new(Delivery {
                pending: VecDeque::new(),
                delivering: false,
            }),
            subscribers: Subscribers::new(),
        }
    }

    pub(crate) fn id(&self) -> ReferenceId {
        self.id
    }

    pub(crate) fn load(&self) -> Arc<V> {
        self.value.load_full()
    }

    /// Apply `mutate` and commit, then notify. Returns the committed value when it changed.
    pub(crate) fn update(&self, mutate: &mut dyn FnMut(&mut V)) -> Option<Arc<V>> {
        let committed = self.commit(mutate);
        self.deliver();
        committed
    }

    /// Apply `mutate` and commit without notifying. Call [`deliver`](Cell::deliver) afterwards.
    pub(crate) fn commit(&self, mutate: &mut dyn FnMut(&mut V)) -> Option<Arc<V>> {
        let mut delivery = self.write.lock();
        let current = self.value.load_full();
        let mut next = V::clone(&current);
        mutate(&mut next);
        if next == *current {
            return None;
        }
        let next = Arc::new(next);
        self.value.store(Arc::clone(&next));
        delivery.pending.push_back(Arc::clone(&next));
        tracing::trace!(reference = %self.id, "committed");
        Some(next)
    }

    /// Hand queued commits to subscribers unless another call is already doing so.
    pub(crate) fn deliver(&self) {
        {
            let mut delivery = self.write.lock();
            if delivery.delivering || delivery.pending.is_empty() {
                return;
            }
            delivery.delivering = true;
        }
        let _guard = DeliveryGuard {
            delivery: &self.write,
        };
        loop {
            let next = {
                let mut delivery = self.write.lock();
                match delivery.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        delivery.delivering = false;
                        return;
                    }
                }
            };
            self.subscribers.notify(&next);
        }
    }

    pub(crate) fn subscribe(&self, on_change: Box<dyn Fn(&V) + Send + Sync>) -> Subscription {
        self.subscribers.insert(on_change)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// A reference that lives only in memory.
///
/// # Examples
///
/// ```
/// use statebox::reference::{InMemoryReference, Reference};
///
/// let reference = InMemoryReference::new(1);
/// reference.set(2);
/// assert_eq!(*reference.load(), 2);
/// ```
pub struct InMemoryReference<V> {
    cell: Cell<V>,
}

impl<V> InMemoryReference<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(value: V) -> Arc<Self> {
        Arc::new(Self {
            cell: Cell::new(value),
        })
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.cell.subscriber_count()
    }
}

impl<V> Reference<V> for InMemoryReference<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn id(&self) -> ReferenceId {
        self.cell.id()
    }

    fn load(&self) -> Arc<V> {
        self.cell.load()
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut V)) {
        self.cell.update(mutate);
    }

    fn subscribe(&self, on_change: Box<dyn Fn(&V) + Send + Sync>) -> Subscription {
        self.cell.subscribe(on_change)
    }
}

impl<V> fmt::Debug for InMemoryReference<V>
where
    V: fmt::Debug + Clone + PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryReference")
            .field("id", &self.cell.id())
            .field("value", &self.cell.load())
            .finish()
    }
}

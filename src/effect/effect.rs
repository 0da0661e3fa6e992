use super::cancel::{CancelId, CancellationToken};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type Work<A> = Box<dyn FnOnce(Emitter<A>) + Send>;

pub(crate) enum Op<A> {
    /// Feed an action straight back into the store.
    Send(A),
    /// Start work on a worker thread.
    Run { ids: Vec<CancelId>, work: Work<A> },
    /// Cancel every running effect tagged with the id.
    Cancel(CancelId),
}

/// Work returned by a reducer, described rather than performed.
///
/// The store hands each effect to its scheduler after the reduce that
/// produced it has committed. Work runs on a worker thread and feeds actions
/// back through an [`Emitter`]; failures are ordinary actions.
///
/// # Examples
///
/// ```
/// use statebox::Effect;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// enum Action { Tick, Start, Stop }
///
/// fn on_start() -> Effect<Action> {
///     Effect::run(|emitter| {
///         while emitter.sleep(Duration::from_millis(10)) {
///             emitter.emit(Action::Tick);
///         }
///     })
///     .cancellable("timer", true)
/// }
///
/// fn on_stop() -> Effect<Action> {
///     Effect::cancel("timer")
/// }
/// # let _ = (on_start(), on_stop(), Action::Start, Action::Stop);
/// ```
pub struct Effect<A> {
    ops: Vec<Op<A>>,
}

impl<A: Send + 'static> Effect<A> {
    /// No work.
    pub fn none() -> Self {
        Self { ops: Vec::new() }
    }

    /// Feed `action` back into the store once the actions already queued are processed.
    pub fn send(action: A) -> Self {
        Self {
            ops: vec![Op::Send(action)],
        }
    }

    /// Run `work` on a worker thread.
    pub fn run(work: impl FnOnce(Emitter<A>) + Send + 'static) -> Self {
        Self {
            ops: vec![Op::Run {
                ids: Vec::new(),
                work: Box::new(work),
            }],
        }
    }

    /// Cancel every running effect marked [`cancellable`](Effect::cancellable) with `id`.
    pub fn cancel<T: std::hash::Hash + 'static>(id: T) -> Self {
        Self {
            ops: vec![Op::Cancel(CancelId::new(id))],
        }
    }

    /// Run all effects, in order of their operations.
    pub fn merge(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        Self {
            ops: effects.into_iter().flat_map(|effect| effect.ops).collect(),
        }
    }

    /// This effect followed by `other`.
    pub fn and(mut self, other: Effect<A>) -> Self {
        self.ops.extend(other.ops);
        self
    }

    /// Tag the work in this effect with `id`, optionally cancelling running work with
    /// the same id first.
    pub fn cancellable<T: std::hash::Hash + 'static>(self, id: T, cancel_in_flight: bool) -> Self {
        self.cancellable_by(CancelId::new(id), cancel_in_flight)
    }

    pub(crate) fn cancellable_by(self, id: CancelId, cancel_in_flight: bool) -> Self {
        let mut ops = Vec::with_capacity(self.ops.len() + 1);
        if cancel_in_flight {
            ops.push(Op::Cancel(id));
        }
        ops.extend(self.ops.into_iter().map(|op| match op {
            Op::Run { mut ids, work } => {
                ids.push(id);
                Op::Run { ids, work }
            }
            other => other,
        }));
        Self { ops }
    }

    /// Transform the actions this effect feeds back.
    pub fn map<B: Send + 'static>(self, f: impl Fn(A) -> B + Send + Sync + 'static) -> Effect<B> {
        let f = Arc::new(f);
        let ops = self
            .ops
            .into_iter()
            .map(|op| match op {
                Op::Send(action) => Op::Send(f(action)),
                Op::Cancel(id) => Op::Cancel(id),
                Op::Run { ids, work } => {
                    let f = Arc::clone(&f);
                    let work: Work<B> = Box::new(move |emitter: Emitter<B>| {
                        work(emitter.contramap(move |action: A| f(action)))
                    });
                    Op::Run { ids, work }
                }
            })
            .collect();
        Effect { ops }
    }

    pub fn is_none(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<Op<A>> {
        self.ops
    }
}

impl<A: Send + 'static> Default for Effect<A> {
    fn default() -> Self {
        Self::none()
    }
}

impl<A: fmt::Debug> fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for op in &self.ops {
            match op {
                Op::Send(action) => list.entry(&format_args!("send({action:?})")),
                Op::Run { ids, .. } => list.entry(&format_args!("run({ids:?})")),
                Op::Cancel(id) => list.entry(&format_args!("cancel({id:?})")),
            };
        }
        list.finish()
    }
}

/// Whatever a sink needs kept alive until cancellation is no longer held off.
///
/// Releasing the last handle of a store cancels its effects, which takes the
/// token lock, so that release must happen after `while_active` returns.
pub(crate) type Hold = Option<Box<dyn Send>>;

/// Destination for actions emitted by running work.
///
/// `enqueue` is called while cancellation is held off and must not block on
/// the store; `flush` runs afterwards and may process what was enqueued.
pub(crate) trait Sink<A>: Send + Sync {
    fn enqueue(&self, action: A) -> Hold;

    fn flush(&self);
}

struct Mapped<A, B> {
    inner: Arc<dyn Sink<B>>,
    f: Box<dyn Fn(A) -> B + Send + Sync>,
}

impl<A, B> Sink<A> for Mapped<A, B> {
    fn enqueue(&self, action: A) -> Hold {
        self.inner.enqueue((self.f)(action))
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Sink that buffers actions and hands them to a callback on flush.
pub(crate) struct CallbackSink<A> {
    pending: Mutex<VecDeque<A>>,
    deliver: Box<dyn Fn(A) + Send + Sync>,
}

impl<A> CallbackSink<A> {
    pub(crate) fn new(deliver: impl Fn(A) + Send + Sync + 'static) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            deliver: Box::new(deliver),
        }
    }
}

impl<A: Send> Sink<A> for CallbackSink<A> {
    fn enqueue(&self, action: A) -> Hold {
        self.pending.lock().push_back(action);
        None
    }

    fn flush(&self) {
        loop {
            let next = self.pending.lock().pop_front();
            match next {
                Some(action) => (self.deliver)(action),
                None => break,
            }
        }
    }
}

/// Handle given to running work for feeding actions back.
pub struct Emitter<A> {
    token: CancellationToken,
    sink: Arc<dyn Sink<A>>,
}

impl<A: Send + 'static> Emitter<A> {
    pub(crate) fn new(token: CancellationToken, sink: Arc<dyn Sink<A>>) -> Self {
        Self { token, sink }
    }

    /// Deliver `action` to the store. Returns `false`, dropping the action,
    /// once the effect has been cancelled.
    pub fn emit(&self, action: A) -> bool {
        let sink = &self.sink;
        let mut hold = None;
        let delivered = self.token.while_active(|| hold = sink.enqueue(action));
        drop(hold);
        if delivered {
            self.sink.flush();
        }
        delivered
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleep for `duration`, waking early on cancellation. Returns `false` when cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        self.token.sleep(duration)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn contramap<B: Send + 'static>(
        self,
        f: impl Fn(B) -> A + Send + Sync + 'static,
    ) -> Emitter<B> {
        Emitter {
            token: self.token,
            sink: Arc::new(Mapped {
                inner: self.sink,
                f: Box::new(f),
            }),
        }
    }
}

impl<A> fmt::Debug for Emitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").field("token", &self.token).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Child {
        Loaded(u32),
    }

    #[derive(Debug, PartialEq)]
    enum Parent {
        Child(Child),
    }

    fn collecting<A: Send + 'static>() -> (Arc<Mutex<Vec<A>>>, Arc<dyn Sink<A>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let sink: Arc<dyn Sink<A>> = Arc::new(CallbackSink::new(move |a| log.lock().push(a)));
        (seen, sink)
    }

    #[test]
    fn cancellable_tags_work_and_prepends_cancel() {
        let effect: Effect<Child> = Effect::run(|_| {}).cancellable("load", true);
        let ops = effect.into_ops();
        assert!(matches!(ops[0], Op::Cancel(id) if id == CancelId::new("load")));
        assert!(matches!(&ops[1], Op::Run { ids, .. } if ids == &vec![CancelId::new("load")]));
    }

    #[test]
    fn map_applies_to_sends_and_running_work() {
        let effect = Effect::merge([
            Effect::send(Child::Loaded(1)),
            Effect::run(|emitter: Emitter<Child>| {
                emitter.emit(Child::Loaded(2));
            }),
        ])
        .map(Parent::Child);

        let (seen, sink) = collecting::<Parent>();
        for op in effect.into_ops() {
            match op {
                Op::Send(action) => seen.lock().push(action),
                Op::Run { work, .. } => work(Emitter::new(CancellationToken::new(), sink.clone())),
                Op::Cancel(_) => unreachable!(),
            }
        }
        assert_eq!(
            *seen.lock(),
            vec![Parent::Child(Child::Loaded(1)), Parent::Child(Child::Loaded(2))]
        );
    }

    #[test]
    fn emit_after_cancel_is_dropped() {
        let (seen, sink) = collecting::<u32>();
        let token = CancellationToken::new();
        let emitter = Emitter::new(token.clone(), sink);
        assert!(emitter.emit(1));
        token.cancel();
        assert!(!emitter.emit(2));
        assert!(emitter.is_cancelled());
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn none_is_empty() {
        assert!(Effect::<u8>::none().is_none());
        assert!(!Effect::send(1u8).is_none());
        assert_eq!(format!("{:?}", Effect::send(3u8)), "[send(3)]");
    }
}

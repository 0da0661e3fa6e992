use crate::effect::Effect;
use crate::path::{CasePath, KeyPath};
use std::marker::PhantomData;

/// Evolves state in response to actions.
///
/// `reduce` is the only place state is ever mutated. It runs on the thread
/// that drains the store's queue, one action at a time.
///
/// Implemented for every `Fn(&mut S, A) -> Effect<A>` closure.
pub trait Reducer<S, A>: Send + Sync + 'static {
    fn reduce(&self, state: &mut S, action: A) -> Effect<A>;
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(&mut S, A) -> Effect<A> + Send + Sync + 'static,
{
    fn reduce(&self, state: &mut S, action: A) -> Effect<A> {
        self(state, action)
    }
}

/// Pins down the state and action types of a reducer closure.
///
/// ```
/// use statebox::store::reduce_fn;
/// use statebox::Effect;
///
/// let counter = reduce_fn(|count: &mut i32, delta: i32| {
///     *count += delta;
///     Effect::none()
/// });
/// # let _ = counter;
/// ```
pub fn reduce_fn<S, A, F>(f: F) -> impl Reducer<S, A>
where
    S: 'static,
    A: 'static,
    F: Fn(&mut S, A) -> Effect<A> + Send + Sync + 'static,
{
    f
}

/// Two reducers run in order on the same action.
pub struct Combine<R1, R2> {
    first: R1,
    second: R2,
}

/// Run `first`, then `second`, merging their effects.
pub fn combine<S, A, R1, R2>(first: R1, second: R2) -> Combine<R1, R2>
where
    A: Clone + Send + 'static,
    R1: Reducer<S, A>,
    R2: Reducer<S, A>,
{
    Combine { first, second }
}

impl<S, A, R1, R2> Reducer<S, A> for Combine<R1, R2>
where
    A: Clone + Send + 'static,
    R1: Reducer<S, A>,
    R2: Reducer<S, A>,
{
    fn reduce(&self, state: &mut S, action: A) -> Effect<A> {
        let first = self.first.reduce(state, action.clone());
        first.and(self.second.reduce(state, action))
    }
}

/// A child reducer embedded into a parent domain.
pub struct Scope<S, A, CS, CA, R> {
    state: KeyPath<S, CS>,
    action: CasePath<A, CA>,
    child: R,
    _domain: PhantomData<fn(CS, CA)>,
}

/// Run `child` on the part of the state `state` reaches, for actions in the `action` case.
///
/// Other actions leave the state untouched. Effects of the child are mapped
/// back into the parent action type.
pub fn scope<S, A, CS, CA, R>(
    state: KeyPath<S, CS>,
    action: CasePath<A, CA>,
    child: R,
) -> Scope<S, A, CS, CA, R>
where
    S: 'static,
    A: Send + 'static,
    CS: 'static,
    CA: Send + 'static,
    R: Reducer<CS, CA>,
{
    Scope {
        state,
        action,
        child,
        _domain: PhantomData,
    }
}

impl<S, A, CS, CA, R> Reducer<S, A> for Scope<S, A, CS, CA, R>
where
    S: 'static,
    A: Send + 'static,
    CS: 'static,
    CA: Send + 'static,
    R: Reducer<CS, CA>,
{
    fn reduce(&self, state: &mut S, action: A) -> Effect<A> {
        let Ok(child_action) = self.action.try_into_value(action) else {
            return Effect::none();
        };
        let effect = self
            .state
            .with_mut(state, |child| self.child.reduce(child, child_action));
        let embed = self.action.clone();
        effect.map(move |child_action| embed.embed(child_action))
    }
}

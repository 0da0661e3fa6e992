use super::state::{PresentationAction, PresentationState};
use crate::effect::Effect;
use crate::path::{CasePath, KeyPath};
use crate::store::Reducer;
use std::marker::PhantomData;

/// A parent reducer integrated with an optionally presented child.
pub struct Presents<S, A, CS, CA, P, C> {
    parent: P,
    state: KeyPath<S, PresentationState<CS>>,
    action: CasePath<A, PresentationAction<CA>>,
    child: C,
    _domain: PhantomData<fn(CS, CA)>,
}

/// Run `child` on the presented state for `Presented` actions, then `parent`.
///
/// Effects the child starts are tied to its presentation: once the
/// presentation ends, by `Dismiss`, by the parent clearing the state, or by
/// the parent presenting something new, they are cancelled. A `Presented`
/// action that arrives while nothing is presented is logged and skipped.
pub fn presents<S, A, CS, CA, P, C>(
    parent: P,
    state: KeyPath<S, PresentationState<CS>>,
    action: CasePath<A, PresentationAction<CA>>,
    child: C,
) -> Presents<S, A, CS, CA, P, C>
where
    S: 'static,
    A: Clone + Send + 'static,
    CS: 'static,
    CA: Send + 'static,
    P: Reducer<S, A>,
    C: Reducer<CS, CA>,
{
    Presents {
        parent,
        state,
        action,
        child,
        _domain: PhantomData,
    }
}

impl<S, A, CS, CA, P, C> Reducer<S, A> for Presents<S, A, CS, CA, P, C>
where
    S: 'static,
    A: Clone + Send + 'static,
    CS: 'static,
    CA: Send + 'static,
    P: Reducer<S, A>,
    C: Reducer<CS, CA>,
{
    fn reduce(&self, state: &mut S, action: A) -> Effect<A> {
        let before = self.state.with(state, PresentationState::id);
        let mut effects = Vec::with_capacity(3);

        let dismiss = match self.action.try_into_value(action.clone()) {
            Ok(PresentationAction::Presented(child_action)) => {
                let reduced = self.state.with_mut(state, |presentation| {
                    let id = presentation.id()?;
                    let child = presentation.as_mut()?;
                    Some((id, self.child.reduce(child, child_action)))
                });
                match reduced {
                    Some((id, effect)) => {
                        let embed = self.action.clone();
                        effects.push(
                            effect
                                .map(move |child_action| {
                                    embed.embed(PresentationAction::Presented(child_action))
                                })
                                .cancellable(id, false),
                        );
                    }
                    None => tracing::warn!(
                        path = %self.state.id(),
                        "presented action received with nothing presented"
                    ),
                }
                false
            }
            Ok(PresentationAction::Dismiss) => true,
            Err(_) => false,
        };

        effects.push(self.parent.reduce(state, action));
        if dismiss {
            self.state.with_mut(state, |presentation| {
                presentation.dismiss();
            });
        }

        let after = self.state.with(state, PresentationState::id);
        if let Some(before) = before.filter(|before| after != Some(*before)) {
            effects.push(Effect::cancel(before));
        }
        Effect::merge(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{case_path, key_path};

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Parent {
        sheet: PresentationState<i32>,
        dismissals: usize,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum ParentAction {
        Open(i32),
        Close,
        Sheet(PresentationAction<i32>),
    }

    fn parent(state: &mut Parent, action: ParentAction) -> Effect<ParentAction> {
        match action {
            ParentAction::Open(value) => {
                state.sheet.present(value);
            }
            ParentAction::Close => {
                state.sheet.dismiss();
            }
            ParentAction::Sheet(PresentationAction::Dismiss) => state.dismissals += 1,
            ParentAction::Sheet(PresentationAction::Presented(_)) => {}
        }
        Effect::none()
    }

    fn sheet(state: &mut i32, delta: i32) -> Effect<i32> {
        *state += delta;
        Effect::none()
    }

    fn reducer() -> impl Reducer<Parent, ParentAction> {
        presents(
            parent,
            key_path!(Parent => sheet),
            case_path!(ParentAction::Sheet),
            sheet,
        )
    }

    #[test]
    fn child_runs_before_parent_and_dismiss_clears() {
        let reducer = reducer();
        let mut state = Parent::default();
        reducer.reduce(&mut state, ParentAction::Open(1));
        reducer.reduce(&mut state, ParentAction::Sheet(PresentationAction::Presented(4)));
        assert_eq!(state.sheet.as_ref(), Some(&5));

        reducer.reduce(&mut state, ParentAction::Sheet(PresentationAction::Dismiss));
        assert!(!state.sheet.is_presented());
        assert_eq!(state.dismissals, 1);
    }

    #[test]
    fn presented_action_without_presentation_is_skipped() {
        let reducer = reducer();
        let mut state = Parent::default();
        let effect = reducer.reduce(
            &mut state,
            ParentAction::Sheet(PresentationAction::Presented(1)),
        );
        assert!(!state.sheet.is_presented());
        assert!(effect.is_none());
    }

    #[test]
    fn ending_a_presentation_cancels_its_effects() {
        let reducer = reducer();
        let mut state = Parent::default();
        reducer.reduce(&mut state, ParentAction::Open(1));
        let first = state.sheet.id().unwrap();
        let effect = reducer.reduce(&mut state, ParentAction::Close);
        assert_eq!(
            format!("{effect:?}"),
            format!("{:?}", Effect::<ParentAction>::cancel(first))
        );

        reducer.reduce(&mut state, ParentAction::Open(1));
        let second = state.sheet.id().unwrap();
        let effect = reducer.reduce(&mut state, ParentAction::Open(2));
        assert_eq!(
            format!("{effect:?}"),
            format!("{:?}", Effect::<ParentAction>::cancel(second))
        );
    }
}

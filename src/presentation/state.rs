use crate::path::CasePath;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one presentation. Presenting again, even the same state,
/// yields a new id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PresentationId(u64);

impl PresentationId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        PresentationId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PresentationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "presentation#{}", self.0)
    }
}

/// Optional child feature state: nothing presented, or exactly one child.
///
/// Wrap a destination enum in it to model "at most one of these screens".
///
/// ```
/// use statebox::presentation::PresentationState;
///
/// let mut sheet = PresentationState::default();
/// assert!(!sheet.is_presented());
/// sheet.present(3);
/// *sheet.as_mut().unwrap() += 1;
/// assert_eq!(sheet.as_ref(), Some(&4));
/// assert_eq!(sheet.dismiss(), Some(4));
/// ```
#[derive(Clone, PartialEq)]
pub struct PresentationState<S> {
    presented: Option<(PresentationId, S)>,
}

impl<S> Default for PresentationState<S> {
    fn default() -> Self {
        Self { presented: None }
    }
}

#[allow(clippy::should_implement_trait)]
impl<S> PresentationState<S> {
    pub fn dismissed() -> Self {
        Self::default()
    }

    pub fn presented(state: S) -> Self {
        Self {
            presented: Some((PresentationId::next(), state)),
        }
    }

    /// Present `state`, replacing anything presented before.
    pub fn present(&mut self, state: S) -> PresentationId {
        let id = PresentationId::next();
        self.presented = Some((id, state));
        id
    }

    pub fn dismiss(&mut self) -> Option<S> {
        self.presented.take().map(|(_, state)| state)
    }

    pub fn is_presented(&self) -> bool {
        self.presented.is_some()
    }

    pub fn id(&self) -> Option<PresentationId> {
        self.presented.as_ref().map(|(id, _)| *id)
    }

    pub fn as_ref(&self) -> Option<&S> {
        self.presented.as_ref().map(|(_, state)| state)
    }

    pub fn as_mut(&mut self) -> Option<&mut S> {
        self.presented.as_mut().map(|(_, state)| state)
    }

    fn get(&self, id: PresentationId) -> Option<&S> {
        match &self.presented {
            Some((current, state)) if *current == id => Some(state),
            _ => None,
        }
    }

    fn get_mut(&mut self, id: PresentationId) -> Option<&mut S> {
        match &mut self.presented {
            Some((current, state)) if *current == id => Some(state),
            _ => None,
        }
    }

    fn into_presented(self, id: PresentationId) -> Result<S, Self> {
        match self.presented {
            Some((current, state)) if current == id => Ok(state),
            presented => Err(Self { presented }),
        }
    }
}

impl<S: 'static> PresentationState<S> {
    /// The case "presented with exactly this id".
    pub(crate) fn case(id: PresentationId) -> CasePath<Self, S> {
        CasePath::new(
            format!("PresentationState::presented({})", id.0),
            move |state: S| PresentationState {
                presented: Some((id, state)),
            },
            move |presentation: &PresentationState<S>| presentation.get(id),
            move |presentation: &mut PresentationState<S>| presentation.get_mut(id),
            move |presentation: PresentationState<S>| presentation.into_presented(id),
        )
    }
}

impl<S: fmt::Debug> fmt::Debug for PresentationState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.presented {
            Some((id, state)) => f
                .debug_struct("Presented")
                .field("id", id)
                .field("state", state)
                .finish(),
            None => f.write_str("Dismissed"),
        }
    }
}

/// Actions of a presented child, plus dismissal.
#[derive(Clone, Debug, PartialEq)]
pub enum PresentationAction<A> {
    Presented(A),
    Dismiss,
}

impl<A: 'static> PresentationAction<A> {
    pub(crate) fn presented_case() -> CasePath<Self, A> {
        CasePath::new(
            "PresentationAction::Presented",
            PresentationAction::Presented,
            |action: &PresentationAction<A>| match action {
                PresentationAction::Presented(action) => Some(action),
                PresentationAction::Dismiss => None,
            },
            |action: &mut PresentationAction<A>| match action {
                PresentationAction::Presented(action) => Some(action),
                PresentationAction::Dismiss => None,
            },
            |action: PresentationAction<A>| match action {
                PresentationAction::Presented(action) => Ok(action),
                other => Err(other),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_assigns_fresh_ids() {
        let mut state = PresentationState::dismissed();
        let first = state.present("a");
        let second = state.present("a");
        assert_ne!(first, second);
        assert_eq!(state.id(), Some(second));
    }

    #[test]
    fn case_matches_only_its_presentation() {
        let mut state = PresentationState::presented(1);
        let id = state.id().unwrap();
        let case = PresentationState::case(id);
        assert_eq!(case.extract(&state), Some(&1));

        state.present(1);
        assert_eq!(case.extract(&state), None);
        assert!(case.try_into_value(state).is_err());
    }

    #[test]
    fn presented_action_case() {
        let case = PresentationAction::<u8>::presented_case();
        assert_eq!(case.embed(2), PresentationAction::Presented(2));
        assert_eq!(case.extract(&PresentationAction::Dismiss), None);
    }

    #[test]
    fn debug_shows_presentation() {
        assert_eq!(format!("{:?}", PresentationState::<u8>::dismissed()), "Dismissed");
        assert!(format!("{:?}", PresentationState::presented(5)).contains("state: 5"));
    }
}

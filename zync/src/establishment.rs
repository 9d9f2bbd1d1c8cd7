//! Establishment selector: the venue the session is currently at.
//!
//! Independent of authentication. The app coordinator clears the selection
//! when the session ends.

use crate::types::Establishment;
use zync_core::effect::Effect;
use zync_core::reducer::Reducer;
use zync_core::{smallvec, SmallVec};

/// Current venue, if one was chosen
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EstablishmentState {
    /// Selected venue
    pub current: Option<Establishment>,
}

/// Establishment actions
#[derive(Clone, Debug)]
pub enum EstablishmentAction {
    /// Make `establishment` the current venue
    Select {
        /// Venue
        establishment: Establishment,
    },
    /// Forget the current venue
    Clear,
}

/// Establishment reducer
#[derive(Clone, Debug, Default)]
pub struct EstablishmentReducer;

impl EstablishmentReducer {
    /// Creates a new establishment reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for EstablishmentReducer {
    type State = EstablishmentState;
    type Action = EstablishmentAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            EstablishmentAction::Select { establishment } => {
                tracing::debug!(establishment_id = %establishment.id, "Venue selected");
                state.current = Some(establishment);
            },
            EstablishmentAction::Clear => state.current = None,
        }
        smallvec![Effect::None]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures;
    use zync_testing::{assertions, ReducerTest};

    #[test]
    fn selecting_replaces_the_current_venue() {
        ReducerTest::new(EstablishmentReducer::new())
            .with_env(())
            .given_state(EstablishmentState::default())
            .when_action(EstablishmentAction::Select {
                establishment: fixtures::establishment("e1").unwrap(),
            })
            .when_action(EstablishmentAction::Select {
                establishment: fixtures::establishment("e3").unwrap(),
            })
            .then_state(|s| assert_eq!(s.current.as_ref().unwrap().name, "Ogham"))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn clear_forgets_the_venue() {
        ReducerTest::new(EstablishmentReducer::new())
            .with_env(())
            .given_state(EstablishmentState {
                current: fixtures::establishment("e2"),
            })
            .when_action(EstablishmentAction::Clear)
            .then_state(|s| assert!(s.current.is_none()))
            .run();
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Observable device action states

use crate::{engine::State, interaction::UserInteractionRequired};

/// Progress of a pending action
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct IntermediateValue {
    /// User interaction required to progress
    pub required_user_interaction: UserInteractionRequired,
    /// Current engine step
    pub step: State,
}

/// Device action state, emitted to observers as an action progresses.
///
/// A run emits zero or more [DeviceActionState::Pending] states followed by
/// exactly one terminal state.
#[derive(Clone, PartialEq, Debug)]
pub enum DeviceActionState<O, E> {
    /// Action in progress
    Pending(IntermediateValue),
    /// Action complete
    Completed(O),
    /// Action failed
    Error(E),
}

impl<O, E> DeviceActionState<O, E> {
    /// Check whether the state ends the action
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeviceActionState::Pending(_))
    }

    /// Fetch intermediate value for pending states
    pub fn intermediate(&self) -> Option<&IntermediateValue> {
        match self {
            DeviceActionState::Pending(v) => Some(v),
            _ => None,
        }
    }

    /// Map the output of a completed state
    pub fn map<P>(self, f: impl FnOnce(O) -> P) -> DeviceActionState<P, E> {
        match self {
            DeviceActionState::Pending(v) => DeviceActionState::Pending(v),
            DeviceActionState::Completed(o) => DeviceActionState::Completed(f(o)),
            DeviceActionState::Error(e) => DeviceActionState::Error(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn terminal_states() {
        let p = DeviceActionState::<u8, ()>::Pending(IntermediateValue {
            required_user_interaction: UserInteractionRequired::ConfirmOpenApp,
            step: State::OpenApp,
        });
        assert!(!p.is_terminal());
        assert_eq!(
            p.intermediate().map(|v| v.required_user_interaction),
            Some(UserInteractionRequired::ConfirmOpenApp)
        );

        let c = DeviceActionState::<u8, ()>::Completed(4);
        assert!(c.is_terminal());
        assert_eq!(c.map(|v| v * 2), DeviceActionState::Completed(8));

        assert!(DeviceActionState::<u8, ()>::Error(()).is_terminal());
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

use alloc::string::String;

use super::State;

/// Navigation errors, raised while bringing the target application to the foreground
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum NavigationError {
    /// Device is locked
    #[error("Device is locked")]
    DeviceLocked,

    /// Target application is not installed
    #[error("Application {0} is not installed")]
    AppNotInstalled(String),

    /// User refused to open the application
    #[error("Opening application refused by user")]
    UserRefused,

    /// Device did not report the expected application within the retry limit
    #[error("Device not ready (expected app {expected}, found {actual})")]
    NotReady { expected: String, actual: String },

    /// Event not valid in the current state
    #[error("Unexpected event in state {0}")]
    UnexpectedEvent(State),
}

/// Terminal error for an action, either from navigation or from an executed step
#[derive(Clone, PartialEq, Debug)]
pub enum ActionError<E> {
    Navigation(NavigationError),
    Step(E),
}

impl<E> From<NavigationError> for ActionError<E> {
    fn from(e: NavigationError) -> Self {
        ActionError::Navigation(e)
    }
}

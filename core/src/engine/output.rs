// Copyright (c) 2022-2023 The MobileCoin Foundation

use alloc::string::String;
use core::time::Duration;

use super::ActionError;

/// Side effects requested by the [`Engine`][super::Engine], executed by the caller
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Effect {
    /// Read the running application
    GetAppAndVersion,
    /// Close the running application
    CloseApp,
    /// Open the named application from the dashboard
    OpenApp(String),
    /// Wait before re-reading the running application
    Delay(Duration),
    /// Run the action body in the target application
    Run,
}

/// [`Engine`][super::Engine] output following an update
#[derive(Clone, PartialEq, Debug)]
pub enum Step<O, E> {
    /// Execute an effect and feed the result back as an [`Event`][super::Event]
    Effect(Effect),
    /// Action complete
    Done(O),
    /// Action failed
    Failed(ActionError<E>),
}

impl<O, E> Step<O, E> {
    /// Check whether this step ends the action
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Step::Effect(_))
    }
}

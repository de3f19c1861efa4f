// Copyright (c) 2022-2023 The MobileCoin Foundation

use core::fmt::{Debug, Display};

use tokio::time::error::Elapsed;

use ledger_dmk_apdu::{ApduError, DeviceExchangeError, FrameError, StatusWord};
use ledger_dmk_core::engine::{ActionError, NavigationError};

use crate::{session::SessionId, transport::TransportError};

/// Concurrency errors, returned when a session is already busy
#[derive(Copy, Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum ConcurrencyError {
    /// Another exchange is outstanding on the session
    #[error("Exchange already in flight")]
    ExchangeInFlight,

    /// A device action is running on the session
    #[error("Device action in progress")]
    ActionInProgress,
}

/// Ledger device management error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Framing error
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    /// APDU encoding error
    #[error("APDU error: {0}")]
    Apdu(#[from] ApduError),

    /// Timeout waiting for a device response
    #[error("Timeout waiting for device response")]
    Timeout,

    /// Session busy
    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    /// Error reported by the device
    #[error("{tag}: {message}")]
    Device {
        tag: String,
        message: String,
        status: Option<StatusWord>,
    },

    /// Navigation to the target application failed
    #[error("Navigation failed: {0}")]
    Navigation(#[from] NavigationError),

    /// Device action cancelled
    #[error("Device action cancelled")]
    Cancelled,

    /// Session closed
    #[error("Session closed")]
    SessionClosed,

    /// No session with the provided id
    #[error("Unknown session {0}")]
    UnknownSession(SessionId),

    /// Invalid session configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl Error {
    /// Fetch the status word reported by the device, if any
    pub fn status_word(&self) -> Option<StatusWord> {
        match self {
            Error::Device { status, .. } => *status,
            _ => None,
        }
    }

    /// Check whether the transport has disconnected
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Disconnected))
    }
}

impl<C: Display + Debug> From<DeviceExchangeError<C>> for Error {
    fn from(e: DeviceExchangeError<C>) -> Self {
        Error::Device {
            tag: e.tag(),
            message: e.message,
            status: e.status,
        }
    }
}

impl From<ActionError<Error>> for Error {
    fn from(e: ActionError<Error>) -> Self {
        match e {
            ActionError::Navigation(n) => Error::Navigation(n),
            ActionError::Step(e) => e,
        }
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::Timeout
    }
}

#[cfg(test)]
mod test {
    use ledger_dmk_apdu::{ApduResponse, Command, GlobalErrorCode};

    use super::*;

    #[test]
    fn device_error_status() {
        let resp = ApduResponse::new(vec![], 0x5515);
        let e: Error = ledger_dmk_apdu::os::CloseApp.decode(resp).unwrap_err().into();

        assert_eq!(e.status_word(), Some(StatusWord::LOCKED_DEVICE));
        assert_eq!(
            e.to_string(),
            format!(
                "{}: {}",
                GlobalErrorCode::DeviceLocked,
                GlobalErrorCode::DeviceLocked.message()
            )
        );
    }

    #[test]
    fn unknown_device_error() {
        let resp = ApduResponse::new(vec![], 0x6123);
        let e: Error = ledger_dmk_apdu::os::CloseApp.decode(resp).unwrap_err().into();

        assert_eq!(e.status_word(), Some(StatusWord(0x6123)));
        assert!(matches!(e, Error::Device { tag, .. } if tag == "UnknownDeviceExchangeError"));
    }

    #[test]
    fn action_error_flattened() {
        let e = Error::from(ActionError::Navigation(NavigationError::UserRefused));
        assert!(matches!(e, Error::Navigation(NavigationError::UserRefused)));

        let e = Error::from(ActionError::Step(Error::Timeout));
        assert!(matches!(e, Error::Timeout));
    }

    #[test]
    fn disconnected() {
        assert!(Error::from(TransportError::Disconnected).is_disconnected());
        assert!(!Error::Timeout.is_disconnected());
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ledger device management library
//!
//! This provides host-side sessions for communicating with Ledger devices
//! over frame-based transports, and the runtime for composing multi-step
//! device actions.
//!
//! - [Transport] abstracts frame I/O for concrete transports (USB-HID, BLE, proxies)
//! - [DeviceSession] owns a connection, exchanging APDUs one at a time,
//!   tracking [DeviceSessionState] and refreshing the running application
//! - [DeviceAction]s are executed on a session, navigating to the target
//!   application then running the action body, with progress streamed as
//!   [DeviceActionState]s
//! - [SessionManager] tracks multiple independent sessions
//!
//! ```no_run
//! # use ledger_dmk::*;
//! # async fn example<T: Transport>(transport: T) -> Result<(), Error> {
//! let session = DeviceSession::connect(transport, SessionOptions::default())?;
//!
//! // Open the Bitcoin application, closing any running application first
//! let run = session.execute_device_action(OpenAppDeviceAction::new("Bitcoin"))?;
//! run.result().await?;
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

/// Re-export `ledger-dmk-apdu` for consumers
pub use ledger_dmk_apdu::{self as apdu};

pub use ledger_dmk_core::{
    action::{DeviceActionState, IntermediateValue},
    engine::{NavigationError, State as ActionStep},
    UserInteractionRequired,
};

pub mod action;
pub use action::{
    CallTaskInAppDeviceAction, DeviceAction, DeviceActionRun, DeviceApi, DeviceStatusOutput,
    GetDeviceStatusDeviceAction, GoToDashboardDeviceAction, ListAppsDeviceAction,
    OpenAppDeviceAction, SendCommandInAppDeviceAction,
};

mod cancel;

pub mod channel;

mod error;
pub use error::{ConcurrencyError, Error};

mod manager;
pub use manager::SessionManager;

mod observer;
pub use observer::Subscription;

mod options;
pub use options::SessionOptions;

pub mod session;
pub use session::{DeviceSession, DeviceSessionState, DeviceStatus, SessionId};

pub mod transport;
pub use transport::{Transport, TransportError};

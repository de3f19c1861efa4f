// Copyright (c) 2022-2023 The MobileCoin Foundation

use strum::{Display, EnumIter, EnumString};

use ledger_dmk_core::engine::SessionSnapshot;

/// Device status, tracked alongside the session state
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Display, EnumString, EnumIter)]
pub enum DeviceStatus {
    /// Connected and idle
    #[default]
    Connected,
    /// Device reported locked
    Locked,
    /// Device action running
    Busy,
    /// Not connected
    NotConnected,
}

/// Device session state
///
/// States are replaced on every transition, observers receive the latest
/// state on subscription and every subsequent change.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum DeviceSessionState {
    /// Connected, running application not yet known
    Connected { status: DeviceStatus },

    /// Running application known
    ReadyWithoutSecureChannel {
        status: DeviceStatus,
        current_app: String,
        current_app_version: String,
    },

    /// Running application known, secure channel established
    ReadyWithSecureChannel {
        status: DeviceStatus,
        current_app: String,
        current_app_version: String,
    },

    /// Session closed or device disconnected
    Disconnected,
}

impl DeviceSessionState {
    /// Fetch the device status
    pub fn status(&self) -> DeviceStatus {
        match self {
            Self::Connected { status }
            | Self::ReadyWithoutSecureChannel { status, .. }
            | Self::ReadyWithSecureChannel { status, .. } => *status,
            Self::Disconnected => DeviceStatus::NotConnected,
        }
    }

    /// Fetch the running application, if known
    pub fn current_app(&self) -> Option<&str> {
        match self {
            Self::ReadyWithoutSecureChannel { current_app, .. }
            | Self::ReadyWithSecureChannel { current_app, .. } => Some(current_app),
            _ => None,
        }
    }

    /// Fetch the running application version, if known
    pub fn current_app_version(&self) -> Option<&str> {
        match self {
            Self::ReadyWithoutSecureChannel {
                current_app_version,
                ..
            }
            | Self::ReadyWithSecureChannel {
                current_app_version,
                ..
            } => Some(current_app_version),
            _ => None,
        }
    }

    /// Check whether the session is disconnected
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Build a new state with the provided status
    pub fn with_status(&self, status: DeviceStatus) -> Self {
        match self.clone() {
            Self::Connected { .. } => Self::Connected { status },
            Self::ReadyWithoutSecureChannel {
                current_app,
                current_app_version,
                ..
            } => Self::ReadyWithoutSecureChannel {
                status,
                current_app,
                current_app_version,
            },
            Self::ReadyWithSecureChannel {
                current_app,
                current_app_version,
                ..
            } => Self::ReadyWithSecureChannel {
                status,
                current_app,
                current_app_version,
            },
            Self::Disconnected => Self::Disconnected,
        }
    }

    /// Build a new state for the provided running application
    pub fn with_app(&self, name: &str, version: &str) -> Self {
        match self {
            Self::Disconnected => Self::Disconnected,
            _ => Self::ReadyWithoutSecureChannel {
                status: self.status(),
                current_app: name.to_string(),
                current_app_version: version.to_string(),
            },
        }
    }

    /// Snapshot of the state for device action navigation
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            locked: self.status() == DeviceStatus::Locked,
            current_app: self.current_app().map(String::from),
        }
    }
}

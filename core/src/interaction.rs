// Copyright (c) 2022-2023 The MobileCoin Foundation

use strum::{Display, EnumIter, EnumString};

/// User interaction required on the device to progress an action
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, EnumString, Display, EnumIter)]
pub enum UserInteractionRequired {
    /// No interaction required
    #[default]
    None,
    /// Unlock the device (enter PIN)
    UnlockDevice,
    /// Confirm opening the target application
    ConfirmOpenApp,
    /// Allow listing installed applications
    AllowListApps,
    /// Verify an address on the device display
    VerifyAddress,
    /// Review and sign a transaction
    SignTransaction,
    /// Review and sign a personal message
    SignPersonalMessage,
    /// Review and sign typed data
    SignTypedData,
}

impl UserInteractionRequired {
    /// Check whether the user must act on the device
    pub fn is_required(&self) -> bool {
        *self != UserInteractionRequired::None
    }
}

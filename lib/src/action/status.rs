// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use async_trait::async_trait;

use super::{DeviceAction, DeviceApi};
use crate::Error;

/// Running application reported by [GetDeviceStatusDeviceAction]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DeviceStatusOutput {
    pub current_app: String,
    pub current_app_version: String,
}

/// Read the running application, waiting for the user to unlock the
/// device if required.
///
/// This runs in whichever application is open, no navigation is performed.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct GetDeviceStatusDeviceAction {
    unlock_timeout: Option<Duration>,
}

impl GetDeviceStatusDeviceAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the session unlock timeout for this action
    pub fn with_unlock_timeout(mut self, timeout: Duration) -> Self {
        self.unlock_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl DeviceAction for GetDeviceStatusDeviceAction {
    type Output = DeviceStatusOutput;

    fn app_name(&self) -> Option<&str> {
        None
    }

    fn unlock_timeout(&self) -> Option<Duration> {
        self.unlock_timeout
    }

    async fn run(&self, api: &DeviceApi) -> Result<DeviceStatusOutput, Error> {
        // Running application was read immediately before the body runs
        let s = api.state();

        match (s.current_app(), s.current_app_version()) {
            (Some(app), Some(version)) => Ok(DeviceStatusOutput {
                current_app: app.to_string(),
                current_app_version: version.to_string(),
            }),
            _ => Err(Error::SessionClosed),
        }
    }
}

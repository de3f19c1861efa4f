// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;

use ledger_dmk_apdu::os::DASHBOARD_APP_NAME;

use super::{DeviceAction, DeviceApi};
use crate::Error;

/// Open an application, closing any other running application first
#[derive(Clone, PartialEq, Debug)]
pub struct OpenAppDeviceAction {
    app_name: String,
}

impl OpenAppDeviceAction {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

#[async_trait]
impl DeviceAction for OpenAppDeviceAction {
    type Output = ();

    fn app_name(&self) -> Option<&str> {
        Some(&self.app_name)
    }

    async fn run(&self, _api: &DeviceApi) -> Result<(), Error> {
        Ok(())
    }
}

/// Return to the dashboard, closing any running application
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct GoToDashboardDeviceAction;

#[async_trait]
impl DeviceAction for GoToDashboardDeviceAction {
    type Output = ();

    fn app_name(&self) -> Option<&str> {
        Some(DASHBOARD_APP_NAME)
    }

    async fn run(&self, _api: &DeviceApi) -> Result<(), Error> {
        Ok(())
    }
}

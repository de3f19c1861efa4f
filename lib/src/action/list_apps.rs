// Copyright (c) 2022-2023 The MobileCoin Foundation

use async_trait::async_trait;
use log::debug;

use ledger_dmk_apdu::os::{AppEntry, ListApps, DASHBOARD_APP_NAME};
use ledger_dmk_core::UserInteractionRequired;

use super::{DeviceAction, DeviceApi};
use crate::Error;

/// List installed applications from the dashboard
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct ListAppsDeviceAction;

#[async_trait]
impl DeviceAction for ListAppsDeviceAction {
    type Output = Vec<AppEntry>;

    fn app_name(&self) -> Option<&str> {
        Some(DASHBOARD_APP_NAME)
    }

    fn required_user_interaction(&self) -> UserInteractionRequired {
        UserInteractionRequired::AllowListApps
    }

    async fn run(&self, api: &DeviceApi) -> Result<Vec<AppEntry>, Error> {
        let mut apps = api.send_command(&ListApps::first()).await?;
        let mut page_len = apps.len();

        // Request pages until an empty page is returned
        while page_len > 0 {
            let page = api.send_command(&ListApps::next()).await?;
            page_len = page.len();
            apps.extend(page);
        }

        debug!("Found {} installed apps", apps.len());

        Ok(apps)
    }
}

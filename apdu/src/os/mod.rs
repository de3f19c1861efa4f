// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ledger OS (dashboard) commands
//!
//! These are handled by the device operating system and available
//! regardless of the running application.

mod app_and_version;
pub use app_and_version::{AppAndVersion, GetAppAndVersion};

mod open_app;
pub use open_app::{OpenApp, OpenAppErrorCode};

mod close_app;
pub use close_app::CloseApp;

mod list_apps;
pub use list_apps::{encode_page, AppEntry, ListApps};

/// Class for dashboard commands
pub const OS_CLA: u8 = 0xe0;

/// Class for commands handled by BOLOS in any application
pub const BOLOS_CLA: u8 = 0xb0;

/// Name reported by the dashboard
pub const DASHBOARD_APP_NAME: &str = "BOLOS";

/// Name reported by the dashboard on older firmware
pub const LEGACY_DASHBOARD_APP_NAME: &str = "OLOS\0";

/// Check whether an application name refers to the dashboard
pub fn is_dashboard(name: &str) -> bool {
    name == DASHBOARD_APP_NAME || name == LEGACY_DASHBOARD_APP_NAME
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ledger device action core
//!
//! This provides the [Engine][engine::Engine] sequencing device actions: bringing
//! the target application to the foreground then running the action body, with
//! user interaction requirements reported at each step.
//!
//! Interactions with the [Engine][engine::Engine] are performed via
//! [Event][engine::Event]s and [Step][engine::Step]s, see [apdu] for APDU
//! objects and wire encodings.
//!
//! ## Navigation
//!
//! 1. If the session is known to be locked the action fails immediately,
//!    requesting [`UnlockDevice`][UserInteractionRequired::UnlockDevice]
//! 2. If the running application is unknown, issue
//!    [`GetAppAndVersion`][apdu::os::GetAppAndVersion]
//! 3. If a non-target application is running, issue
//!    [`CloseApp`][apdu::os::CloseApp] to return to the dashboard
//! 4. From the dashboard, issue [`OpenApp`][apdu::os::OpenApp] for the target
//!    (requesting [`ConfirmOpenApp`][UserInteractionRequired::ConfirmOpenApp])
//! 5. Re-read the running application after each switch, waiting and retrying
//!    a bounded number of times while the switch settles
//! 6. Run the action body in the target application
//!

extern crate alloc;

pub use ledger_dmk_apdu::{self as apdu};

pub mod action;

pub mod engine;

mod interaction;
pub use interaction::UserInteractionRequired;

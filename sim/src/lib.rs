// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated Ledger device for testing
//!
//! [SimDevice] models the dashboard and installed applications of a Ledger
//! device, handling OS commands (`GetAppAndVersion`, `OpenApp`, `CloseApp`,
//! `ListApps`) and forwarding other APDUs to per-application handlers.
//! [SimTransport] implements [ledger_dmk::Transport] over the simulated device,
//! speaking the framed protocol so sessions exercise the full exchange path.
//!
//! Faults (transport failures, latency, unresponsive devices, locking,
//! refusal of user prompts) may be injected via [SimDevice] for testing.

mod device;
pub use device::{Handler, SimDevice, LIST_PAGE_SIZE};

mod transport;
pub use transport::SimTransport;

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Prelude to simplify downstream use of APDU objects
//!

pub use crate::{
    command::{chunks, decode_interruptible, decode_with, Chunk},
    os::{
        AppAndVersion, AppEntry, CloseApp, GetAppAndVersion, ListApps, OpenApp, OpenAppErrorCode,
    },
    Apdu, ApduBuilder, ApduError, ApduParser, ApduResponse, Command, CommandResult,
    DeviceExchangeError, ErrorKind, GlobalErrorCode, Interruptible, StatusWord,
};

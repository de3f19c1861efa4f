// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for Ledger device communication
//!
//! This crate provides the wire-level pieces shared by hosts and simulated devices:
//!
//! - [frame] splits APDUs into transport sized frames and reassembles responses
//! - [Apdu] / [ApduResponse] model requests and responses, with [ApduBuilder]
//!   and [ApduParser] for variable bodies
//! - [command] defines the [Command] contract and status word classification
//!   against command specific and [global][GlobalErrorCode] error tables
//! - [os] provides dashboard commands used for application navigation
//!
//! Frame headers and APDU fields are big-endian.

pub mod apdu;
pub use apdu::{Apdu, ApduResponse, ApduStatic};

mod builder;
pub use builder::{ApduBuilder, ApduParser};

pub mod command;
pub use command::{Command, CommandResult, ErrorEntry, ErrorTable, Interruptible};

mod error;
pub use error::{ApduError, DeviceExchangeError, ErrorKind};

pub mod frame;
pub use frame::{Frame, FrameError, Framer, Reassembler, Reassembly};

pub mod helpers;

pub mod os;

pub mod prelude;

mod status;
pub use status::{GlobalErrorCode, StatusWord};

/// Encode an object to a new buffer
pub fn encode_to_vec<E: encdec::Encode<Error = ApduError>>(v: &E) -> Result<Vec<u8>, ApduError> {
    let mut b = vec![0u8; v.encode_len()?];
    let n = v.encode(&mut b)?;
    b.truncate(n);
    Ok(b)
}

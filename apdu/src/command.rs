// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command contract and status word classification
//!
//! Commands encode a request [Apdu] and decode an [ApduResponse] into a
//! [CommandResult]. Status words are classified in a fixed order:
//!
//! 1. `0x9000` is success
//! 2. the command specific [ErrorTable]
//! 3. the global table ([GlobalErrorCode])
//! 4. otherwise an unknown error carrying the raw status word

use core::fmt::{Debug, Display};

use crate::{Apdu, ApduError, ApduResponse, DeviceExchangeError, GlobalErrorCode, StatusWord};

/// Result of a single command exchange
pub type CommandResult<T, C> = Result<T, DeviceExchangeError<C>>;

/// Command specific status word entry
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ErrorEntry<C> {
    pub status: StatusWord,
    pub code: C,
    pub message: &'static str,
}

/// Static table mapping status words to command errors
pub type ErrorTable<C> = &'static [ErrorEntry<C>];

/// Device command
pub trait Command: Send + Sync {
    /// Decoded response type
    type Response: Send;

    /// Command specific error codes, use [core::convert::Infallible] where none exist
    type ErrorCode: Copy + Display + Debug + Send + Sync + 'static;

    /// Build the request APDU
    fn encode(&self) -> Result<Apdu, ApduError>;

    /// Decode the device response
    fn decode(&self, resp: ApduResponse) -> CommandResult<Self::Response, Self::ErrorCode>;
}

/// Classify a response status word, returning `Ok(())` for success
pub fn classify<C: Copy + Display + Debug>(
    resp: &ApduResponse,
    table: &[ErrorEntry<C>],
) -> Result<(), DeviceExchangeError<C>> {
    let sw = resp.status();

    if sw == StatusWord::SUCCESS {
        return Ok(());
    }

    if let Some(e) = table.iter().find(|e| e.status == sw) {
        return Err(DeviceExchangeError::command(e.code, e.message, sw));
    }

    match sw.global() {
        Some(g) => Err(DeviceExchangeError::global(g)),
        None => Err(DeviceExchangeError::unknown(sw)),
    }
}

/// Classify a response then parse the data of a successful response
pub fn decode_with<T, C: Copy + Display + Debug>(
    resp: &ApduResponse,
    table: &[ErrorEntry<C>],
    parse: impl FnOnce(&[u8]) -> Result<T, ApduError>,
) -> CommandResult<T, C> {
    classify(resp, table)?;

    parse(resp.data()).map_err(DeviceExchangeError::invalid_response)
}

/// Outcome for commands using the interrupted execution convention
#[derive(Clone, PartialEq, Debug)]
pub enum Interruptible<T> {
    /// Command completed
    Complete(T),
    /// Device requested more data (`0xE000`), the response carries the request
    Interrupted(ApduResponse),
}

/// Classify a response for a command that may be interrupted, exposing
/// interrupted responses to the caller's continuation loop
pub fn decode_interruptible<T, C: Copy + Display + Debug>(
    resp: ApduResponse,
    table: &[ErrorEntry<C>],
    parse: impl FnOnce(&[u8]) -> Result<T, ApduError>,
) -> CommandResult<Interruptible<T>, C> {
    if resp.is_interrupted() {
        return Ok(Interruptible::Interrupted(resp));
    }

    decode_with(&resp, table, parse).map(Interruptible::Complete)
}

/// Check whether a status word is in the global table with the given code
pub fn is_global(sw: StatusWord, code: GlobalErrorCode) -> bool {
    sw.global() == Some(code)
}

/// Chunk of a multi-part command payload
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Chunk<'a> {
    pub data: &'a [u8],
    pub is_first: bool,
    pub is_last: bool,
}

/// Split a payload for commands sent in multiple chunks
///
/// An empty payload yields a single empty chunk flagged both first and last.
pub fn chunks(payload: &[u8], size: usize) -> impl Iterator<Item = Chunk<'_>> {
    let size = size.max(1);
    let count = match payload.len() {
        0 => 1,
        n => (n + size - 1) / size,
    };

    (0..count).map(move |i| {
        let start = i * size;
        let end = (start + size).min(payload.len());

        Chunk {
            data: &payload[start..end],
            is_first: i == 0,
            is_last: i + 1 == count,
        }
    })
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Open application APDU

use encdec::{DecodeOwned, Encode};
use strum::{Display, EnumIter, EnumString};

use super::OS_CLA;
use crate::{
    command::{decode_with, Command, CommandResult, ErrorEntry, ErrorTable},
    Apdu, ApduError, ApduResponse, ApduStatic, StatusWord,
};

/// Errors specific to [OpenApp]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
pub enum OpenAppErrorCode {
    /// Application is not installed
    AppNotFound,
    /// No application name provided
    NoAppName,
}

const OPEN_APP_ERRORS: ErrorTable<OpenAppErrorCode> = &[
    ErrorEntry {
        status: StatusWord(0x6807),
        code: OpenAppErrorCode::AppNotFound,
        message: "Unknown application name",
    },
    ErrorEntry {
        status: StatusWord(0x670a),
        code: OpenAppErrorCode::NoAppName,
        message: "No app name provided",
    },
];

/// Open an application from the dashboard, `E0 D8 00 00 LC NAME`
///
/// The device prompts the user to confirm, the response is returned
/// once the user accepts or refuses.
#[derive(Clone, PartialEq, Debug)]
pub struct OpenApp {
    /// Application name (ASCII)
    pub name: String,
}

impl OpenApp {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ApduStatic for OpenApp {
    const CLA: u8 = OS_CLA;

    const INS: u8 = 0xd8;
}

impl Encode for OpenApp {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.name.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.name.len();
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        buff[..n].copy_from_slice(self.name.as_bytes());

        Ok(n)
    }
}

impl DecodeOwned for OpenApp {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let name = core::str::from_utf8(buff).map_err(|_| ApduError::Utf8)?;

        Ok((Self::new(name), buff.len()))
    }
}

impl Command for OpenApp {
    type Response = ();
    type ErrorCode = OpenAppErrorCode;

    fn encode(&self) -> Result<Apdu, ApduError> {
        Apdu::from_req(self, 0x00, 0x00)
    }

    fn decode(&self, resp: ApduResponse) -> CommandResult<(), OpenAppErrorCode> {
        decode_with(&resp, OPEN_APP_ERRORS, |_| Ok(()))
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

use core::fmt::{Debug, Display};

use crate::{GlobalErrorCode, StatusWord};

/// APDU encoding / decoding errors
#[derive(Copy, Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum ApduError {
    /// Buffer too short for the requested field
    #[error("Invalid length")]
    InvalidLength,

    /// Field contents invalid
    #[error("Invalid encoding")]
    InvalidEncoding,

    /// String field is not valid UTF-8
    #[error("Invalid utf8 string")]
    Utf8,

    /// APDU body exceeds the single byte Lc limit
    #[error("APDU data too long ({0} bytes, maximum 255)")]
    DataTooLong(usize),

    /// Response shorter than the two byte status word
    #[error("Response missing status word")]
    MissingStatusWord,

    /// Unexpected response format version
    #[error("Unexpected response format (0x{0:02x})")]
    UnexpectedFormat(u8),
}

impl From<encdec::Error> for ApduError {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ApduError::InvalidLength,
            #[allow(unreachable_patterns)]
            _ => ApduError::InvalidEncoding,
        }
    }
}

/// Classification of a device exchange failure
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ErrorKind<C> {
    /// Status word found in the command specific error table
    Command(C),
    /// Status word found in the global error table
    Global(GlobalErrorCode),
    /// Status word not found in any table
    Unknown,
    /// Success response that could not be decoded
    InvalidResponse(ApduError),
}

impl<C: Display> Display for ErrorKind<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ErrorKind::Command(c) => write!(f, "{c}"),
            ErrorKind::Global(g) => write!(f, "{g}"),
            ErrorKind::Unknown => write!(f, "UnknownDeviceExchangeError"),
            ErrorKind::InvalidResponse(_) => write!(f, "InvalidResponse"),
        }
    }
}

/// Device-reported failure for a single command exchange
///
/// These are values returned in a [CommandResult][crate::CommandResult],
/// they are never retried automatically.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DeviceExchangeError<C: Display + Debug> {
    /// Error classification (tag)
    pub kind: ErrorKind<C>,
    /// Human readable message
    pub message: String,
    /// Raw status word where applicable
    pub status: Option<StatusWord>,
}

impl<C: Display + Debug> DeviceExchangeError<C> {
    /// Error from a command specific error table
    pub fn command(code: C, message: impl Into<String>, status: StatusWord) -> Self {
        Self {
            kind: ErrorKind::Command(code),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Error from the global status word table
    pub fn global(code: GlobalErrorCode) -> Self {
        Self {
            kind: ErrorKind::Global(code),
            message: code.message().to_string(),
            status: Some(code.status()),
        }
    }

    /// Unrecognised status word
    pub fn unknown(status: StatusWord) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            message: format!("Unexpected device exchange error happened: {status}"),
            status: Some(status),
        }
    }

    /// Successful response with undecodable data
    pub fn invalid_response(cause: ApduError) -> Self {
        Self {
            kind: ErrorKind::InvalidResponse(cause),
            message: cause.to_string(),
            status: None,
        }
    }

    /// Wrapped cause, if any
    pub fn cause(&self) -> Option<&ApduError> {
        match &self.kind {
            ErrorKind::InvalidResponse(e) => Some(e),
            _ => None,
        }
    }

    /// Tag identifying the error for display / mapping
    pub fn tag(&self) -> String {
        self.kind.to_string()
    }

    /// Check whether this error reports a locked device
    pub fn is_locked(&self) -> bool {
        self.status == Some(StatusWord::LOCKED_DEVICE)
    }
}

impl<C: Display + Debug> Display for DeviceExchangeError<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(s) = self.status {
            write!(f, " (0x{s})")?;
        }
        Ok(())
    }
}

impl<C: Display + Debug> std::error::Error for DeviceExchangeError<C> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::InvalidResponse(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exchange_error_display() {
        let e = DeviceExchangeError::<GlobalErrorCode>::global(GlobalErrorCode::DeviceLocked);
        assert_eq!(e.to_string(), "DeviceLocked: Device is locked (0x5515)");
        assert!(e.is_locked());

        let e = DeviceExchangeError::<GlobalErrorCode>::unknown(StatusWord(0x1234));
        assert_eq!(e.tag(), "UnknownDeviceExchangeError");
        assert_eq!(e.status, Some(StatusWord(0x1234)));

        let e = DeviceExchangeError::<GlobalErrorCode>::invalid_response(ApduError::Utf8);
        assert_eq!(e.cause(), Some(&ApduError::Utf8));
        assert_eq!(e.status, None);
    }
}

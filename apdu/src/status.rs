// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Status words and the global status word table

use core::{fmt, str::FromStr};

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};

use crate::ApduError;

/// Two byte APDU status word, displayed and parsed as four hex digits
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusWord(pub u16);

impl StatusWord {
    /// Command executed successfully
    pub const SUCCESS: Self = Self(0x9000);

    /// Device interrupted execution and requests more data from the host
    pub const INTERRUPTED_EXECUTION: Self = Self(0xe000);

    /// Device is locked (PIN required)
    pub const LOCKED_DEVICE: Self = Self(0x5515);

    pub const fn from_be_bytes(b: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(b))
    }

    pub const fn to_be_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Lookup this status word in the global table
    pub fn global(&self) -> Option<GlobalErrorCode> {
        GlobalErrorCode::try_from(self.0).ok()
    }
}

impl From<u16> for StatusWord {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

impl From<StatusWord> for u16 {
    fn from(sw: StatusWord) -> Self {
        sw.0
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl fmt::Debug for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusWord({:04x})", self.0)
    }
}

impl FromStr for StatusWord {
    type Err = ApduError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 4 {
            return Err(ApduError::InvalidEncoding);
        }

        u16::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ApduError::InvalidEncoding)
    }
}

/// Well known status words shared by every command
#[derive(
    Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter, TryFromPrimitive,
)]
#[repr(u16)]
pub enum GlobalErrorCode {
    UserRefusedOnDevice = 0x5501,
    PinNotSet = 0x5502,
    DeviceLocked = 0x5515,
    WrongLength = 0x6700,
    SecurityConditionNotSatisfied = 0x6982,
    ConditionsNotSatisfied = 0x6985,
    InvalidData = 0x6a80,
    WrongParameters = 0x6b00,
    InstructionNotSupported = 0x6d00,
    ClassNotSupported = 0x6e00,
    TechnicalProblem = 0x6f00,
    DeviceHalted = 0x6faa,
}

impl GlobalErrorCode {
    /// Status word for this error code
    pub fn status(&self) -> StatusWord {
        StatusWord(*self as u16)
    }

    /// Human readable message for this error code
    pub fn message(&self) -> &'static str {
        use GlobalErrorCode::*;

        match self {
            UserRefusedOnDevice => "Action refused on device",
            PinNotSet => "Pin is not set",
            DeviceLocked => "Device is locked",
            WrongLength => "Incorrect length",
            SecurityConditionNotSatisfied => "Security condition not satisfied",
            ConditionsNotSatisfied => "Conditions of use not satisfied",
            InvalidData => "Invalid data",
            WrongParameters => "Incorrect parameters P1 or P2",
            InstructionNotSupported => "Instruction not supported",
            ClassNotSupported => "Class not supported",
            TechnicalProblem => "Technical problem",
            DeviceHalted => "Device halted",
        }
    }
}

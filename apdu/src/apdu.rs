// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Request and response APDU objects

use core::fmt::{self, Debug, Display};

use encdec::{DecodeOwned, Encode};

use crate::{helpers::split_tail, ApduError, StatusWord};

/// Size of the fixed APDU header (CLA, INS, P1, P2)
pub const APDU_HEADER_LEN: usize = 4;

/// Maximum APDU body length (single-byte Lc)
pub const APDU_MAX_DATA_LEN: usize = 255;

/// Static APDU class / instruction for request objects
pub trait ApduStatic {
    /// Class for request APDU
    const CLA: u8;

    /// Instruction for request APDU
    const INS: u8;
}

/// Request APDU
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      CLA      |      INS      |       P1      |       P2      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      LC       |                    DATA...                    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `LC` is always present, so an APDU with no data encodes to five bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Apdu {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8>,
}

impl Apdu {
    /// Create a new APDU, data must not exceed [APDU_MAX_DATA_LEN]
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Result<Self, ApduError> {
        if data.len() > APDU_MAX_DATA_LEN {
            return Err(ApduError::DataTooLong(data.len()));
        }

        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data,
        })
    }

    /// Create an APDU with an empty body
    pub fn empty(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
        }
    }

    /// Create an APDU from a request object with static CLA / INS
    pub fn from_req<R: ApduStatic + Encode<Error = ApduError>>(
        req: &R,
        p1: u8,
        p2: u8,
    ) -> Result<Self, ApduError> {
        let mut data = vec![0u8; req.encode_len()?];
        let n = req.encode(&mut data)?;
        data.truncate(n);

        Self::new(R::CLA, R::INS, p1, p2, data)
    }

    pub fn cla(&self) -> u8 {
        self.cla
    }

    pub fn ins(&self) -> u8 {
        self.ins
    }

    pub fn p1(&self) -> u8 {
        self.p1
    }

    pub fn p2(&self) -> u8 {
        self.p2
    }

    /// APDU body
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Encode APDU to raw bytes for framing
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(APDU_HEADER_LEN + 1 + self.data.len());
        b.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2, self.data.len() as u8]);
        b.extend_from_slice(&self.data);
        b
    }
}

impl Encode for Apdu {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(APDU_HEADER_LEN + 1 + self.data.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        buff[..APDU_HEADER_LEN].copy_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        buff[APDU_HEADER_LEN] = self.data.len() as u8;
        buff[APDU_HEADER_LEN + 1..][..self.data.len()].copy_from_slice(&self.data);

        Ok(n)
    }
}

impl DecodeOwned for Apdu {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < APDU_HEADER_LEN + 1 {
            return Err(ApduError::InvalidLength);
        }

        let lc = buff[APDU_HEADER_LEN] as usize;
        let body = &buff[APDU_HEADER_LEN + 1..];
        if body.len() < lc {
            return Err(ApduError::InvalidLength);
        }

        let apdu = Self {
            cla: buff[0],
            ins: buff[1],
            p1: buff[2],
            p2: buff[3],
            data: body[..lc].to_vec(),
        };

        Ok((apdu, APDU_HEADER_LEN + 1 + lc))
    }
}

impl Debug for Apdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Apdu({})", hex::encode(self.to_bytes()))
    }
}

impl Display for Apdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

/// Response APDU, a data buffer followed by a two byte status word
#[derive(Clone, PartialEq, Eq)]
pub struct ApduResponse {
    data: Vec<u8>,
    status: StatusWord,
}

impl ApduResponse {
    /// Create a response from data and status word
    pub fn new(data: Vec<u8>, status: impl Into<StatusWord>) -> Self {
        Self {
            data,
            status: status.into(),
        }
    }

    /// Parse a raw response payload, the trailing two bytes are the status word
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ApduError> {
        if raw.len() < 2 {
            return Err(ApduError::MissingStatusWord);
        }

        let (data, sw) = split_tail(raw, 2);

        Ok(Self {
            data: data.to_vec(),
            status: StatusWord::from_be_bytes([sw[0], sw[1]]),
        })
    }

    /// Response data (without status word)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the response, returning the data buffer
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Response status word
    pub fn status(&self) -> StatusWord {
        self.status
    }

    /// Check whether the response reports success
    pub fn is_success(&self) -> bool {
        self.status == StatusWord::SUCCESS
    }

    /// Check whether the device interrupted execution to request more data
    pub fn is_interrupted(&self) -> bool {
        self.status == StatusWord::INTERRUPTED_EXECUTION
    }

    /// Encode response to raw bytes (data followed by status word)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(self.data.len() + 2);
        b.extend_from_slice(&self.data);
        b.extend_from_slice(&self.status.to_be_bytes());
        b
    }
}

impl Debug for ApduResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ApduResponse {{ data: {}, status: {} }}",
            hex::encode(&self.data),
            self.status
        )
    }
}

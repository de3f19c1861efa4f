// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Incremental APDU body construction and parsing

use byteorder::{BigEndian, ByteOrder};

use crate::{apdu::APDU_MAX_DATA_LEN, Apdu, ApduError};

/// Builder for APDUs with variable bodies
///
/// Integer fields are big-endian, length-value fields use a single byte length.
#[derive(Clone, Debug)]
pub struct ApduBuilder {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8>,
    err: Option<ApduError>,
}

impl ApduBuilder {
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            err: None,
        }
    }

    /// Append a single byte
    pub fn add_u8(mut self, v: u8) -> Self {
        self.push(&[v]);
        self
    }

    /// Append a big-endian u16
    pub fn add_u16(mut self, v: u16) -> Self {
        let mut b = [0u8; 2];
        BigEndian::write_u16(&mut b, v);
        self.push(&b);
        self
    }

    /// Append a big-endian u32
    pub fn add_u32(mut self, v: u32) -> Self {
        let mut b = [0u8; 4];
        BigEndian::write_u32(&mut b, v);
        self.push(&b);
        self
    }

    /// Append raw bytes
    pub fn add_bytes(mut self, v: &[u8]) -> Self {
        self.push(v);
        self
    }

    /// Append a length-prefixed byte field
    pub fn add_lv_bytes(mut self, v: &[u8]) -> Self {
        if v.len() > u8::MAX as usize {
            self.err.get_or_insert(ApduError::DataTooLong(v.len()));
            return self;
        }

        self.push(&[v.len() as u8]);
        self.push(v);
        self
    }

    /// Append a length-prefixed ASCII string
    pub fn add_lv_str(self, v: &str) -> Self {
        self.add_lv_bytes(v.as_bytes())
    }

    /// Remaining body capacity in bytes
    pub fn remaining(&self) -> usize {
        APDU_MAX_DATA_LEN.saturating_sub(self.data.len())
    }

    /// Build the APDU, failing if any field overflowed the body
    pub fn build(self) -> Result<Apdu, ApduError> {
        if let Some(e) = self.err {
            return Err(e);
        }

        Apdu::new(self.cla, self.ins, self.p1, self.p2, self.data)
    }

    fn push(&mut self, v: &[u8]) {
        if self.data.len() + v.len() > APDU_MAX_DATA_LEN {
            self.err
                .get_or_insert(ApduError::DataTooLong(self.data.len() + v.len()));
            return;
        }

        self.data.extend_from_slice(v);
    }
}

/// Cursor over response data
#[derive(Clone, Debug)]
pub struct ApduParser<'a> {
    buff: &'a [u8],
    index: usize,
}

impl<'a> ApduParser<'a> {
    pub fn new(buff: &'a [u8]) -> Self {
        Self { buff, index: 0 }
    }

    /// Bytes remaining to be parsed
    pub fn remaining(&self) -> usize {
        self.buff.len() - self.index
    }

    /// Current offset into the buffer
    pub fn offset(&self) -> usize {
        self.index
    }

    pub fn u8(&mut self) -> Result<u8, ApduError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ApduError> {
        self.take(2).map(BigEndian::read_u16)
    }

    pub fn u32(&mut self) -> Result<u32, ApduError> {
        self.take(4).map(BigEndian::read_u32)
    }

    /// Take `n` bytes
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ApduError> {
        if self.remaining() < n {
            return Err(ApduError::InvalidLength);
        }

        let b = &self.buff[self.index..][..n];
        self.index += n;

        Ok(b)
    }

    /// Take a fixed size array
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], ApduError> {
        let mut a = [0u8; N];
        a.copy_from_slice(self.take(N)?);
        Ok(a)
    }

    /// Take a length-prefixed byte field
    pub fn lv(&mut self) -> Result<&'a [u8], ApduError> {
        let n = self.u8()? as usize;
        self.take(n)
    }

    /// Take a length-prefixed UTF-8 string
    pub fn lv_str(&mut self) -> Result<&'a str, ApduError> {
        core::str::from_utf8(self.lv()?).map_err(|_| ApduError::Utf8)
    }

    /// Take all remaining bytes
    pub fn rest(&mut self) -> &'a [u8] {
        let b = &self.buff[self.index..];
        self.index = self.buff.len();
        b
    }
}

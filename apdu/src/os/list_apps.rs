// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Installed application listing APDUs
//!
//! Listing is paginated, the first request uses [ListApps] with
//! `is_continue: false` and subsequent pages are requested with
//! `is_continue: true` until an empty response is returned.

use core::convert::Infallible;

use encdec::{DecodeOwned, Encode};

use super::OS_CLA;
use crate::{
    command::{decode_with, Command, CommandResult},
    encode_to_vec, Apdu, ApduError, ApduParser, ApduResponse,
};

/// Instruction to start listing
const INS_LIST_FIRST: u8 = 0xde;

/// Instruction to continue listing
const INS_LIST_NEXT: u8 = 0xdf;

/// Response format version
const FORMAT_VERSION: u8 = 0x01;

/// Request a page of installed applications, `E0 DE 00 00 00` / `E0 DF 00 00 00`
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct ListApps {
    /// Request the next page rather than restarting the listing
    pub is_continue: bool,
}

impl ListApps {
    pub fn first() -> Self {
        Self { is_continue: false }
    }

    pub fn next() -> Self {
        Self { is_continue: true }
    }
}

impl Command for ListApps {
    type Response = Vec<AppEntry>;
    type ErrorCode = Infallible;

    fn encode(&self) -> Result<Apdu, ApduError> {
        let ins = match self.is_continue {
            false => INS_LIST_FIRST,
            true => INS_LIST_NEXT,
        };

        Ok(Apdu::empty(OS_CLA, ins, 0x00, 0x00))
    }

    fn decode(&self, resp: ApduResponse) -> CommandResult<Vec<AppEntry>, Infallible> {
        decode_with(&resp, &[], decode_page)
    }
}

/// Decode a page of application entries, an empty page ends the listing
fn decode_page(buff: &[u8]) -> Result<Vec<AppEntry>, ApduError> {
    let mut apps = Vec::new();
    if buff.is_empty() {
        return Ok(apps);
    }

    let format = buff[0];
    if format != FORMAT_VERSION {
        return Err(ApduError::UnexpectedFormat(format));
    }

    let mut index = 1;
    while index < buff.len() {
        let (app, n) = AppEntry::decode_owned(&buff[index..])?;
        apps.push(app);
        index += n;
    }

    Ok(apps)
}

/// Encode a page of application entries, as returned by the device
pub fn encode_page(apps: &[AppEntry]) -> Result<Vec<u8>, ApduError> {
    if apps.is_empty() {
        return Ok(Vec::new());
    }

    let mut b = vec![FORMAT_VERSION];
    for a in apps {
        b.extend_from_slice(&encode_to_vec(a)?);
    }

    Ok(b)
}

/// Installed application entry
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   ENTRY_LEN   |            BLOCKS             |     FLAGS     /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /     FLAGS     |             CODE_HASH (32 bytes)              /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// /                       FULL_HASH (32 bytes)                    /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   NAME_LEN    |                     NAME...                   /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `ENTRY_LEN` covers the bytes following it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AppEntry {
    /// Application size in flash blocks
    pub blocks: u16,
    /// Application flags
    pub flags: u16,
    /// Hash of the application code
    pub code_hash: [u8; 32],
    /// Hash of the full application
    pub full_hash: [u8; 32],
    /// Application name
    pub name: String,
}

impl AppEntry {
    /// Length of the fixed part of the entry (excluding the name)
    const FIXED_LEN: usize = 2 + 2 + 32 + 32 + 1;
}

impl Encode for AppEntry {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(1 + Self::FIXED_LEN + self.name.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }
        if n - 1 > u8::MAX as usize {
            return Err(ApduError::DataTooLong(n - 1));
        }

        buff[0] = (n - 1) as u8;
        buff[1..3].copy_from_slice(&self.blocks.to_be_bytes());
        buff[3..5].copy_from_slice(&self.flags.to_be_bytes());
        buff[5..37].copy_from_slice(&self.code_hash);
        buff[37..69].copy_from_slice(&self.full_hash);
        buff[69] = self.name.len() as u8;
        buff[70..n].copy_from_slice(self.name.as_bytes());

        Ok(n)
    }
}

impl DecodeOwned for AppEntry {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let mut p = ApduParser::new(buff);

        let entry_len = p.u8()? as usize;
        if entry_len < Self::FIXED_LEN {
            return Err(ApduError::InvalidEncoding);
        }

        let mut e = ApduParser::new(p.take(entry_len)?);
        let app = Self {
            blocks: e.u16()?,
            flags: e.u16()?,
            code_hash: e.array()?,
            full_hash: e.array()?,
            name: e.lv_str()?.to_string(),
        };

        Ok((app, 1 + entry_len))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(name: &str) -> AppEntry {
        AppEntry {
            blocks: 0x0102,
            flags: 0x0a00,
            code_hash: [0x11; 32],
            full_hash: [0x22; 32],
            name: name.to_string(),
        }
    }

    #[test]
    fn list_apps_apdu() {
        let a = ListApps { is_continue: false }.encode().unwrap();
        assert_eq!(a.to_bytes(), vec![0xe0, 0xde, 0x00, 0x00, 0x00]);

        let a = ListApps::next().encode().unwrap();
        assert_eq!(a.to_bytes(), vec![0xe0, 0xdf, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn list_apps_page() {
        let apps = vec![entry("Bitcoin"), entry("Ethereum")];
        let data = encode_page(&apps).unwrap();

        assert_eq!(data[0], 0x01);
        assert_eq!(data[1] as usize, AppEntry::FIXED_LEN + 7);

        let decoded = ListApps::first()
            .decode(ApduResponse::new(data, 0x9000))
            .unwrap();
        assert_eq!(decoded, apps);
    }

    #[test]
    fn list_apps_end() {
        let decoded = ListApps::next()
            .decode(ApduResponse::new(vec![], 0x9000))
            .unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn list_apps_truncated() {
        let mut data = encode_page(&[entry("Bitcoin")]).unwrap();
        data.truncate(data.len() - 2);

        let e = ListApps::first()
            .decode(ApduResponse::new(data, 0x9000))
            .unwrap_err();
        assert_eq!(e.cause(), Some(&ApduError::InvalidLength));
    }
}

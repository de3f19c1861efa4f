// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Running application and version APDUs

use core::convert::Infallible;

use encdec::{DecodeOwned, Encode};

use super::BOLOS_CLA;
use crate::{
    command::{decode_with, Command, CommandResult},
    Apdu, ApduError, ApduParser, ApduResponse, ApduStatic,
};

/// Response format version
const FORMAT_VERSION: u8 = 0x01;

/// Fetch the running application name and version, `B0 01 00 00 00`
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct GetAppAndVersion;

impl ApduStatic for GetAppAndVersion {
    const CLA: u8 = BOLOS_CLA;

    const INS: u8 = 0x01;
}

impl Encode for GetAppAndVersion {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(0)
    }

    fn encode(&self, _buff: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(0)
    }
}

impl Command for GetAppAndVersion {
    type Response = AppAndVersion;
    type ErrorCode = Infallible;

    fn encode(&self) -> Result<Apdu, ApduError> {
        Apdu::from_req(self, 0x00, 0x00)
    }

    fn decode(&self, resp: ApduResponse) -> CommandResult<AppAndVersion, Infallible> {
        decode_with(&resp, &[], |d| AppAndVersion::decode_owned(d).map(|(v, _)| v))
    }
}

/// Running application information
///
/// ## Encoding
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    FORMAT     |   NAME_LEN    |            NAME...            /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  VERSION_LEN  |                   VERSION...                  /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   FLAGS_LEN   |                    FLAGS...                   /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The flags field is optional.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct AppAndVersion {
    /// Application name
    pub name: String,
    /// Application version
    pub version: String,
    /// Application flags (opaque)
    pub flags: Option<Vec<u8>>,
}

impl AppAndVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            flags: None,
        }
    }

    /// Check whether this is the dashboard
    pub fn is_dashboard(&self) -> bool {
        super::is_dashboard(&self.name)
    }
}

impl Encode for AppAndVersion {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        let mut n = 1 + 1 + self.name.len() + 1 + self.version.len();
        if let Some(f) = &self.flags {
            n += 1 + f.len();
        }
        Ok(n)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        let mut index = 0;
        buff[index] = FORMAT_VERSION;
        index += 1;

        let mut fields = vec![self.name.as_bytes(), self.version.as_bytes()];
        if let Some(f) = &self.flags {
            fields.push(f);
        }

        for f in fields {
            if f.len() > u8::MAX as usize {
                return Err(ApduError::DataTooLong(f.len()));
            }

            buff[index] = f.len() as u8;
            buff[index + 1..][..f.len()].copy_from_slice(f);
            index += 1 + f.len();
        }

        Ok(index)
    }
}

impl DecodeOwned for AppAndVersion {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        let mut p = ApduParser::new(buff);

        let format = p.u8()?;
        if format != FORMAT_VERSION {
            return Err(ApduError::UnexpectedFormat(format));
        }

        let name = p.lv_str()?.to_string();
        let version = p.lv_str()?.to_string();

        let flags = match p.remaining() {
            0 => None,
            _ => Some(p.lv()?.to_vec()),
        };

        Ok((
            Self {
                name,
                version,
                flags,
            },
            p.offset(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ErrorKind, GlobalErrorCode, StatusWord};

    #[test]
    fn get_app_and_version_apdu() {
        let a = Command::encode(&GetAppAndVersion).unwrap();
        assert_eq!(a.to_bytes(), vec![0xb0, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn decode_app_and_version() {
        let data = [
            0x01, 0x07, b'B', b'i', b't', b'c', b'o', b'i', b'n', 0x05, b'2', b'.', b'1', b'.',
            b'0', 0x01, 0x02,
        ];

        let r = GetAppAndVersion
            .decode(ApduResponse::new(data.to_vec(), 0x9000))
            .unwrap();

        assert_eq!(r.name, "Bitcoin");
        assert_eq!(r.version, "2.1.0");
        assert_eq!(r.flags, Some(vec![0x02]));
        assert!(!r.is_dashboard());

        // Re-encoding produces the same bytes
        let mut buff = [0u8; 64];
        let n = r.encode(&mut buff).unwrap();
        assert_eq!(&buff[..n], &data);
    }

    #[test]
    fn decode_dashboard_without_flags() {
        let v = AppAndVersion::new("BOLOS", "1.1.0");

        let mut buff = [0u8; 64];
        let n = v.encode(&mut buff).unwrap();

        let r = GetAppAndVersion
            .decode(ApduResponse::new(buff[..n].to_vec(), 0x9000))
            .unwrap();
        assert_eq!(r, v);
        assert!(r.is_dashboard());
    }

    #[test]
    fn decode_invalid_format() {
        let e = GetAppAndVersion
            .decode(ApduResponse::new(vec![0x02, 0x00, 0x00], 0x9000))
            .unwrap_err();
        assert_eq!(
            e.kind,
            ErrorKind::InvalidResponse(ApduError::UnexpectedFormat(0x02))
        );

        let e = GetAppAndVersion
            .decode(ApduResponse::new(vec![0x01, 0x09, b'B'], 0x9000))
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidResponse(ApduError::InvalidLength));
    }

    #[test]
    fn decode_locked() {
        let e = GetAppAndVersion
            .decode(ApduResponse::new(vec![], 0x5515))
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::Global(GlobalErrorCode::DeviceLocked));
        assert_eq!(e.status, Some(StatusWord::LOCKED_DEVICE));
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

use core::convert::Infallible;

use super::BOLOS_CLA;
use crate::{
    command::{decode_with, Command, CommandResult},
    Apdu, ApduError, ApduResponse, ApduStatic,
};

/// Close the running application and return to the dashboard, `B0 A7 00 00 00`
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct CloseApp;

impl ApduStatic for CloseApp {
    const CLA: u8 = BOLOS_CLA;

    const INS: u8 = 0xa7;
}

impl Command for CloseApp {
    type Response = ();
    type ErrorCode = Infallible;

    fn encode(&self) -> Result<Apdu, ApduError> {
        Ok(Apdu::empty(Self::CLA, Self::INS, 0x00, 0x00))
    }

    fn decode(&self, resp: ApduResponse) -> CommandResult<(), Infallible> {
        decode_with(&resp, &[], |_| Ok(()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn close_app_apdu() {
        let a = CloseApp.encode().unwrap();
        assert_eq!(a.to_bytes(), vec![0xb0, 0xa7, 0x00, 0x00, 0x00]);

        assert_eq!(CloseApp.decode(ApduResponse::new(vec![], 0x9000)), Ok(()));
        assert!(CloseApp.decode(ApduResponse::new(vec![], 0x6d00)).is_err());
    }
}

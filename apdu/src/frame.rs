// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transport framing for APDU exchanges
//!
//! APDUs and responses are split into fixed size frames for transmission over
//! size-limited transports (USB-HID reports, BLE characteristics, network proxies),
//! and reassembled on receipt.
//!
//! ## Encoding
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            CHANNEL            |      TAG      |  INDEX (MSB)  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  INDEX (LSB)  |     LENGTH (INDEX 0 ONLY)     |   PAYLOAD...  /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! All fields are big-endian. Frames are always `frame_size` bytes long,
//! the final frame is zero padded.

use byteorder::{BigEndian, ByteOrder};
use encdec::{DecodeOwned, Encode};

use crate::{ApduError, ApduResponse};

/// Protocol tag for APDU frames
pub const FRAME_TAG: u8 = 0x05;

/// Header length for the first frame of an exchange (includes total length)
pub const FIRST_HEADER_LEN: usize = 7;

/// Header length for continuation frames
pub const HEADER_LEN: usize = 5;

/// Maximum payload length (two byte length field)
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Frame codec errors
#[derive(Copy, Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum FrameError {
    /// Frame size too small to carry a header and payload
    #[error("Invalid frame size {0} (minimum 8)")]
    InvalidFrameSize(usize),

    /// Payload too large for the two byte length field
    #[error("APDU too large for framing ({0} bytes)")]
    ApduTooLarge(usize),

    /// Frame shorter than the required header
    #[error("Malformed frame ({0} bytes)")]
    MalformedFrame(usize),

    /// Frame received out of sequence (skipped, repeated or reordered)
    #[error("Unexpected frame sequence index {actual} (expected {expected})")]
    UnexpectedSequence { expected: u16, actual: u16 },

    /// Frame received on an unexpected channel
    #[error("Unexpected channel 0x{actual:04x} (expected 0x{expected:04x})")]
    ChannelMismatch { expected: u16, actual: u16 },

    /// Frame tag is not [FRAME_TAG]
    #[error("Invalid frame tag 0x{0:02x}")]
    InvalidTag(u8),

    /// Complete response shorter than the status word
    #[error("Response missing status word")]
    MissingStatusWord,
}

impl From<encdec::Error> for FrameError {
    fn from(_: encdec::Error) -> Self {
        FrameError::MalformedFrame(0)
    }
}

/// Frame header
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FrameHeader {
    /// Logical channel identifier
    pub channel: u16,
    /// Protocol tag, always [FRAME_TAG] for APDU frames
    pub tag: u8,
    /// Sequence index within the exchange
    pub index: u16,
    /// Total payload length, present on the first frame only
    pub data_len: Option<u16>,
}

impl FrameHeader {
    /// Encoded header length
    pub fn encoded_len(&self) -> usize {
        match self.data_len {
            Some(_) => FIRST_HEADER_LEN,
            None => HEADER_LEN,
        }
    }
}

impl Encode for FrameHeader {
    type Error = FrameError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.encoded_len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encoded_len();
        if buff.len() < n {
            return Err(FrameError::MalformedFrame(buff.len()));
        }

        BigEndian::write_u16(&mut buff[0..2], self.channel);
        buff[2] = self.tag;
        BigEndian::write_u16(&mut buff[3..5], self.index);
        if let Some(l) = self.data_len {
            BigEndian::write_u16(&mut buff[5..7], l);
        }

        Ok(n)
    }
}

impl DecodeOwned for FrameHeader {
    type Output = Self;
    type Error = FrameError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < HEADER_LEN {
            return Err(FrameError::MalformedFrame(buff.len()));
        }

        let channel = BigEndian::read_u16(&buff[0..2]);
        let tag = buff[2];
        let index = BigEndian::read_u16(&buff[3..5]);

        // Only the first frame carries the total length
        let data_len = match index {
            0 if buff.len() < FIRST_HEADER_LEN => {
                return Err(FrameError::MalformedFrame(buff.len()))
            }
            0 => Some(BigEndian::read_u16(&buff[5..7])),
            _ => None,
        };

        let h = Self {
            channel,
            tag,
            index,
            data_len,
        };

        Ok((h, h.encoded_len()))
    }
}

/// A single transport frame
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Frame {
    pub header: FrameHeader,
    /// Payload (including any zero padding)
    pub payload: Vec<u8>,
}

impl Frame {
    /// Encode frame to raw bytes for transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![0u8; self.header.encoded_len() + self.payload.len()];
        // Header encoding only fails on short buffers
        let n = self.header.encode(&mut b).unwrap_or_default();
        b[n..].copy_from_slice(&self.payload);
        b
    }
}

impl Encode for Frame {
    type Error = FrameError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(self.header.encoded_len() + self.payload.len())
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let n = self.encode_len()?;
        if buff.len() < n {
            return Err(FrameError::MalformedFrame(buff.len()));
        }

        let h = self.header.encode(buff)?;
        buff[h..n].copy_from_slice(&self.payload);

        Ok(n)
    }
}

/// Splits APDUs into frames for a given frame size and channel
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Framer {
    frame_size: usize,
    channel: u16,
}

impl Framer {
    /// Create a new framer, `frame_size` must fit the first frame header
    /// plus at least one payload byte
    pub fn new(frame_size: usize, channel: u16) -> Result<Self, FrameError> {
        if frame_size <= FIRST_HEADER_LEN {
            return Err(FrameError::InvalidFrameSize(frame_size));
        }

        Ok(Self {
            frame_size,
            channel,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Split a raw APDU into an ordered sequence of frames
    ///
    /// A zero-length APDU yields exactly one frame.
    pub fn split(&self, apdu: &[u8]) -> Result<Vec<Frame>, FrameError> {
        if apdu.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::ApduTooLarge(apdu.len()));
        }

        let mut frames = Vec::new();
        let mut offset = 0;
        let mut index: u16 = 0;

        loop {
            let header = FrameHeader {
                channel: self.channel,
                tag: FRAME_TAG,
                index,
                data_len: (index == 0).then_some(apdu.len() as u16),
            };

            let capacity = self.frame_size - header.encoded_len();
            let n = capacity.min(apdu.len() - offset);

            let mut payload = vec![0u8; capacity];
            payload[..n].copy_from_slice(&apdu[offset..][..n]);

            frames.push(Frame { header, payload });

            offset += n;
            if offset >= apdu.len() {
                break;
            }

            index += 1;
        }

        Ok(frames)
    }
}

/// Reassembly progress
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Reassembly<T> {
    /// More frames are required
    Incomplete,
    /// Exchange complete
    Complete(T),
}

/// Reassembles received frames into a payload
///
/// One exchange at a time, sequence index 0 starts a new exchange and any
/// other index must follow the previous one.
#[derive(Clone, Debug, Default)]
pub struct Reassembler {
    channel: Option<u16>,
    expected_len: usize,
    next_index: u16,
    buff: Vec<u8>,
}

impl Reassembler {
    /// Create a reassembler accepting frames on any channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reassembler accepting frames on a single channel
    pub fn with_channel(channel: u16) -> Self {
        Self {
            channel: Some(channel),
            ..Default::default()
        }
    }

    /// Discard any partially accumulated exchange
    pub fn reset(&mut self) {
        self.expected_len = 0;
        self.next_index = 0;
        self.buff.clear();
    }

    /// Check whether an exchange is partially accumulated
    pub fn in_progress(&self) -> bool {
        self.next_index != 0
    }

    /// Push a raw frame, returning the accumulated payload once complete
    ///
    /// Errors are fatal for the current exchange and reset the accumulator.
    pub fn push(&mut self, frame: &[u8]) -> Result<Reassembly<Vec<u8>>, FrameError> {
        let r = self.push_inner(frame);
        if let Err(_e) = &r {
            #[cfg(feature = "log")]
            log::debug!("Frame rejected at index {}: {}", self.next_index, _e);

            self.reset();
        }
        r
    }

    /// Push a raw frame, returning the [ApduResponse] once complete
    pub fn push_response(&mut self, frame: &[u8]) -> Result<Reassembly<ApduResponse>, FrameError> {
        match self.push(frame)? {
            Reassembly::Incomplete => Ok(Reassembly::Incomplete),
            Reassembly::Complete(raw) => match ApduResponse::from_bytes(&raw) {
                Ok(r) => Ok(Reassembly::Complete(r)),
                Err(ApduError::MissingStatusWord) => Err(FrameError::MissingStatusWord),
                Err(_) => Err(FrameError::MalformedFrame(raw.len())),
            },
        }
    }

    fn push_inner(&mut self, frame: &[u8]) -> Result<Reassembly<Vec<u8>>, FrameError> {
        let (header, n) = FrameHeader::decode_owned(frame)?;

        if let Some(expected) = self.channel {
            if header.channel != expected {
                return Err(FrameError::ChannelMismatch {
                    expected,
                    actual: header.channel,
                });
            }
        }

        if header.tag != FRAME_TAG {
            return Err(FrameError::InvalidTag(header.tag));
        }

        if header.index != self.next_index {
            return Err(FrameError::UnexpectedSequence {
                expected: self.next_index,
                actual: header.index,
            });
        }

        if let Some(l) = header.data_len {
            self.expected_len = l as usize;
            self.buff.clear();
            self.buff.reserve(self.expected_len);
        }

        // Trailing bytes beyond the declared length are padding
        let remaining = self.expected_len - self.buff.len();
        let payload = &frame[n..];
        self.buff
            .extend_from_slice(&payload[..remaining.min(payload.len())]);

        if self.buff.len() < self.expected_len {
            self.next_index = self.next_index.wrapping_add(1);
            return Ok(Reassembly::Incomplete);
        }

        let out = core::mem::take(&mut self.buff);
        self.reset();

        Ok(Reassembly::Complete(out))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_first_frame_header() {
        let framer = Framer::new(64, 0x0101).unwrap();
        let apdu = [0xaau8; 300];

        let frames = framer.split(&apdu).unwrap();

        // 57 bytes in the first frame then 59 per frame
        assert_eq!(frames.len(), 6);

        let first = frames[0].to_bytes();
        assert_eq!(first.len(), 64);
        assert_eq!(&first[..7], &[0x01, 0x01, 0x05, 0x00, 0x00, 0x01, 0x2c]);

        for (i, f) in frames.iter().enumerate() {
            let b = f.to_bytes();
            assert_eq!(b.len(), 64);
            assert_eq!(&b[..5], &[0x01, 0x01, 0x05, 0x00, i as u8]);
        }

        // Final frame carries 300 - 57 - 4 * 59 = 7 bytes, the rest is padding
        let last = frames[5].to_bytes();
        assert_eq!(&last[5..12], &[0xaa; 7]);
        assert!(last[12..].iter().all(|b| *b == 0));
    }

    #[test]
    fn split_empty_apdu() {
        let framer = Framer::new(64, 0x0101).unwrap();
        let frames = framer.split(&[]).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.data_len, Some(0));

        let mut r = Reassembler::new();
        assert_eq!(
            r.push(&frames[0].to_bytes()),
            Ok(Reassembly::Complete(vec![]))
        );
    }

    #[test]
    fn split_exact_fit() {
        let framer = Framer::new(64, 0x0101).unwrap();

        // Exactly fills the first frame, no trailing empty frame
        let frames = framer.split(&[0x11; 57]).unwrap();
        assert_eq!(frames.len(), 1);

        let frames = framer.split(&[0x11; 58]).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn invalid_frame_size() {
        assert_eq!(Framer::new(0, 0x0101), Err(FrameError::InvalidFrameSize(0)));
        assert_eq!(Framer::new(7, 0x0101), Err(FrameError::InvalidFrameSize(7)));
        assert!(Framer::new(8, 0x0101).is_ok());
    }

    #[test]
    fn apdu_too_large() {
        let framer = Framer::new(64, 0x0101).unwrap();
        let apdu = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            framer.split(&apdu),
            Err(FrameError::ApduTooLarge(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn reassemble_response() {
        let frame = [
            0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x04, 0x01, 0x02, 0x90, 0x00, 0x00, 0x00,
        ];

        let mut r = Reassembler::with_channel(0x0101);
        let resp = match r.push_response(&frame).unwrap() {
            Reassembly::Complete(v) => v,
            Reassembly::Incomplete => panic!("expected complete response"),
        };

        assert_eq!(resp.data(), &[0x01, 0x02]);
        assert_eq!(resp.status().0, 0x9000);
    }

    #[test]
    fn reassemble_skipped_index() {
        let framer = Framer::new(16, 0x0101).unwrap();
        let frames = framer.split(&[0x42; 40]).unwrap();
        assert!(frames.len() > 2);

        let mut r = Reassembler::new();
        assert_eq!(r.push(&frames[0].to_bytes()), Ok(Reassembly::Incomplete));
        assert_eq!(
            r.push(&frames[2].to_bytes()),
            Err(FrameError::UnexpectedSequence {
                expected: 1,
                actual: 2
            })
        );

        // Accumulator is reset following an error
        assert!(!r.in_progress());
    }

    #[test]
    fn reassemble_repeated_index() {
        let framer = Framer::new(16, 0x0101).unwrap();
        let frames = framer.split(&[0x42; 40]).unwrap();

        let mut r = Reassembler::new();
        assert_eq!(r.push(&frames[0].to_bytes()), Ok(Reassembly::Incomplete));
        assert_eq!(r.push(&frames[1].to_bytes()), Ok(Reassembly::Incomplete));
        assert_eq!(
            r.push(&frames[1].to_bytes()),
            Err(FrameError::UnexpectedSequence {
                expected: 2,
                actual: 1
            })
        );

        let mut r = Reassembler::new();
        assert_eq!(r.push(&frames[0].to_bytes()), Ok(Reassembly::Incomplete));
        assert_eq!(
            r.push(&frames[0].to_bytes()),
            Err(FrameError::UnexpectedSequence {
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn reassemble_malformed() {
        let mut r = Reassembler::new();

        assert_eq!(r.push(&[0x01, 0x01, 0x05]), Err(FrameError::MalformedFrame(3)));

        // First frame requires the length field
        assert_eq!(
            r.push(&[0x01, 0x01, 0x05, 0x00, 0x00, 0x00]),
            Err(FrameError::MalformedFrame(6))
        );

        assert_eq!(
            r.push(&[0x01, 0x01, 0x07, 0x00, 0x00, 0x00, 0x02, 0x90, 0x00]),
            Err(FrameError::InvalidTag(0x07))
        );
    }

    #[test]
    fn reassemble_channel_mismatch() {
        let framer = Framer::new(64, 0xaaaa).unwrap();
        let frames = framer.split(&[0x90, 0x00]).unwrap();

        let mut r = Reassembler::with_channel(0x0101);
        assert_eq!(
            r.push(&frames[0].to_bytes()),
            Err(FrameError::ChannelMismatch {
                expected: 0x0101,
                actual: 0xaaaa
            })
        );
    }

    #[test]
    fn reassemble_missing_status_word() {
        let framer = Framer::new(64, 0x0101).unwrap();
        let frames = framer.split(&[0x90]).unwrap();

        let mut r = Reassembler::new();
        assert_eq!(
            r.push_response(&frames[0].to_bytes()),
            Err(FrameError::MissingStatusWord)
        );
    }

    #[test]
    fn reassembler_reuse() {
        let framer = Framer::new(20, 0x0101).unwrap();
        let mut r = Reassembler::new();

        for len in [0usize, 1, 15, 16, 100] {
            let apdu: Vec<u8> = (0..len).map(|i| i as u8).collect();

            let mut out = None;
            for f in framer.split(&apdu).unwrap() {
                if let Reassembly::Complete(v) = r.push(&f.to_bytes()).unwrap() {
                    out = Some(v);
                }
            }

            assert_eq!(out, Some(apdu));
        }
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::collections::VecDeque;

use anyhow::anyhow;
use async_trait::async_trait;
use log::trace;

use ledger_dmk::{Transport, TransportError};
use ledger_dmk_apdu::{Apdu, ApduError, ApduParser, Framer, Reassembler, Reassembly};

use crate::SimDevice;

/// Transport connected to a [SimDevice]
pub struct SimTransport {
    device: SimDevice,
    framer: Option<Framer>,
    reassembler: Reassembler,
    pending: VecDeque<Vec<u8>>,
    closed: bool,
}

impl SimTransport {
    pub(crate) fn new(device: SimDevice, frame_size: usize, channel: u16) -> Self {
        Self {
            device,
            // Invalid frame sizes are rejected by the session prior to use
            framer: Framer::new(frame_size, channel).ok(),
            reassembler: Reassembler::with_channel(channel),
            pending: VecDeque::new(),
            closed: false,
        }
    }

    /// Fetch the device this transport is connected to
    pub fn device(&self) -> &SimDevice {
        &self.device
    }

    /// Check whether the transport has been disconnected by the host
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Decode a raw APDU (header, Lc, data)
fn decode_apdu(raw: &[u8]) -> Result<Apdu, ApduError> {
    let mut p = ApduParser::new(raw);

    let (cla, ins, p1, p2) = (p.u8()?, p.u8()?, p.u8()?, p.u8()?);
    let data = p.lv()?;

    Apdu::new(cla, ins, p1, p2, data.to_vec())
}

fn other(e: impl std::error::Error + Send + Sync + 'static) -> TransportError {
    TransportError::Other(anyhow::Error::new(e))
}

#[async_trait]
impl Transport for SimTransport {
    async fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        {
            let mut s = self.device.lock();
            if self.closed || s.disconnected {
                return Err(TransportError::Disconnected);
            }
            if s.fail_next > 0 {
                s.fail_next -= 1;
                return Err(TransportError::Other(anyhow!("Injected transport failure")));
            }
        }

        trace!("Sim RX frame: {:02x?}", frame);

        let raw = match self.reassembler.push(frame).map_err(other)? {
            Reassembly::Incomplete => return Ok(()),
            Reassembly::Complete(v) => v,
        };

        let apdu = decode_apdu(&raw).map_err(other)?;
        let resp = self.device.lock().handle(&apdu);

        let framer = self
            .framer
            .as_ref()
            .ok_or_else(|| TransportError::Other(anyhow!("Invalid frame size")))?;
        for f in framer.split(&resp.to_bytes()).map_err(other)? {
            self.pending.push_back(f.to_bytes());
        }

        Ok(())
    }

    async fn receive_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        let (latency, unresponsive, disconnected) = {
            let s = self.device.lock();
            (s.latency, s.unresponsive, s.disconnected)
        };

        if self.closed || disconnected {
            return Err(TransportError::Disconnected);
        }

        if unresponsive {
            std::future::pending::<()>().await;
        }

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.pending
            .pop_front()
            .ok_or_else(|| TransportError::Other(anyhow!("No response pending")))
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        trace!("Sim flush, discarding {} frames", self.pending.len());

        self.pending.clear();
        self.reassembler.reset();

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Framed APDU exchange over a [Transport]

use log::{debug, trace};

use ledger_dmk_apdu::{Apdu, ApduResponse, Framer, Reassembler, Reassembly};

use crate::{transport::Transport, Error};

/// APDU channel, framing requests and reassembling responses over a transport.
///
/// A channel carries one exchange at a time. Exchanges that do not complete
/// (due to errors or a timeout dropping the exchange future) leave the channel
/// abandoned, and the transport is flushed prior to the next exchange.
pub struct ApduChannel<T: Transport> {
    transport: T,
    framer: Framer,
    reassembler: Reassembler,
    abandoned: bool,
}

impl<T: Transport> ApduChannel<T> {
    /// Create a new channel with the provided frame size and channel id
    pub fn new(transport: T, frame_size: usize, channel: u16) -> Result<Self, Error> {
        Ok(Self {
            transport,
            framer: Framer::new(frame_size, channel)?,
            reassembler: Reassembler::with_channel(channel),
            abandoned: false,
        })
    }

    /// Check whether the previous exchange was abandoned
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Exchange an APDU with the device, returning the reassembled response
    pub async fn exchange(&mut self, apdu: &Apdu) -> Result<ApduResponse, Error> {
        if self.abandoned {
            debug!("Flushing stale frames from abandoned exchange");
            self.transport.flush().await?;
            self.abandoned = false;
        }

        let raw = apdu.to_bytes();
        debug!("TX: {}", hex::encode(&raw));

        self.reassembler.reset();
        self.abandoned = true;

        for f in self.framer.split(&raw)? {
            let b = f.to_bytes();
            trace!("TX frame: {}", hex::encode(&b));
            self.transport.send_frame(&b).await?;
        }

        loop {
            let b = self.transport.receive_frame().await?;
            trace!("RX frame: {}", hex::encode(&b));

            if let Reassembly::Complete(resp) = self.reassembler.push_response(&b)? {
                debug!("RX: {}", hex::encode(resp.to_bytes()));
                self.abandoned = false;
                return Ok(resp);
            }
        }
    }

    /// Disconnect the underlying transport
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        self.transport.disconnect().await?;
        Ok(())
    }
}

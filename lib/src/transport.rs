// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transport abstraction for frame-level device I/O
//!
//! Concrete transports (USB-HID, BLE, speculos proxies) implement [Transport]
//! to move fixed-size frames to and from a device, see [crate::channel] for
//! framing and exchange over a transport.

use async_trait::async_trait;

/// Transport error type
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Device disconnected
    #[error("Device disconnected")]
    Disconnected,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other transport specific error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Frame transport for a connected device
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write a single frame to the device
    async fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Read the next frame from the device
    async fn receive_frame(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Discard any stale frames following an abandoned exchange
    async fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Close the underlying connection
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Boxed transports, for managing sessions over mixed transport types
#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.as_mut().send_frame(frame).await
    }

    async fn receive_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        self.as_mut().receive_frame().await
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.as_mut().flush().await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.as_mut().disconnect().await
    }
}

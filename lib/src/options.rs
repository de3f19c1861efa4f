// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Session configuration

use std::time::Duration;

use ledger_dmk_apdu::frame::FrameError;
use ledger_dmk_core::engine::NavigationConfig;

use crate::Error;

/// Default frame size (USB-HID report length)
pub const DEFAULT_FRAME_SIZE: usize = 64;

/// Default channel id
pub const DEFAULT_CHANNEL: u16 = 0x0101;

/// Device session options
///
/// These may be flattened into host command line arguments via
/// `#[clap(flatten)]`.
#[derive(Clone, PartialEq, Debug, clap::Args)]
pub struct SessionOptions {
    /// Transport frame size in bytes
    #[clap(long, default_value_t = DEFAULT_FRAME_SIZE)]
    pub frame_size: usize,

    /// Frame channel id (decimal or 0x prefixed hex)
    #[clap(long, default_value_t = DEFAULT_CHANNEL, value_parser = parse_u16)]
    pub channel: u16,

    /// Interval between session state refreshes
    #[clap(long, default_value_t = 1000)]
    pub refresh_interval_ms: u64,

    /// Disable background session refresh
    #[clap(long)]
    pub disable_refresher: bool,

    /// Timeout for each APDU exchange (no timeout if unset)
    #[clap(long)]
    pub exchange_timeout_ms: Option<u64>,

    /// Maximum re-reads while waiting for an application to open or close
    #[clap(long, default_value_t = 3)]
    pub navigation_retries: u8,

    /// Delay between navigation re-reads
    #[clap(long, default_value_t = 500)]
    pub navigation_retry_delay_ms: u64,

    /// Time to wait for a locked device to be unlocked during device actions
    #[clap(long, default_value_t = 15000)]
    pub unlock_timeout_ms: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            channel: DEFAULT_CHANNEL,
            refresh_interval_ms: 1000,
            disable_refresher: false,
            exchange_timeout_ms: None,
            navigation_retries: 3,
            navigation_retry_delay_ms: 500,
            unlock_timeout_ms: 15000,
        }
    }
}

impl SessionOptions {
    /// Validate options, rejecting configurations that cannot work
    pub fn validate(&self) -> Result<(), Error> {
        if self.frame_size <= ledger_dmk_apdu::frame::FIRST_HEADER_LEN {
            return Err(FrameError::InvalidFrameSize(self.frame_size).into());
        }

        if !self.disable_refresher && self.refresh_interval_ms == 0 {
            return Err(Error::InvalidConfig("refresh interval must be non-zero"));
        }

        if self.exchange_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig("exchange timeout must be non-zero"));
        }

        Ok(())
    }

    /// Interval between session refreshes
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Per-exchange timeout, if configured
    pub fn exchange_timeout(&self) -> Option<Duration> {
        self.exchange_timeout_ms.map(Duration::from_millis)
    }

    /// Navigation configuration for device actions
    pub fn navigation(&self) -> NavigationConfig {
        NavigationConfig {
            max_retries: self.navigation_retries,
            retry_delay: Duration::from_millis(self.navigation_retry_delay_ms),
            unlock_timeout: Duration::from_millis(self.unlock_timeout_ms),
        }
    }
}

/// Parse a u16 from decimal or `0x` prefixed hex
fn parse_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(h) => u16::from_str_radix(h, 16),
        None => s.parse(),
    }
}

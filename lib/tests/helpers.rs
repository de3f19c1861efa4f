// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(dead_code)]

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use log::LevelFilter;
use simplelog::SimpleLogger;

use ledger_dmk::{DeviceSession, DeviceSessionState, SessionOptions, Subscription};
use ledger_dmk_sim::{SimDevice, SimTransport};

/// Setup logging, using `LOG_LEVEL` from the environment
pub fn setup_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

/// Session options for tests, with the refresher disabled
pub fn options() -> SessionOptions {
    SessionOptions {
        disable_refresher: true,
        navigation_retry_delay_ms: 100,
        ..Default::default()
    }
}

/// Simulated device with a set of installed apps, running the dashboard
pub fn device() -> SimDevice {
    SimDevice::new()
        .with_app("Bitcoin", "2.1.0")
        .with_app("Ethereum", "1.10.3")
        .with_app("Solana", "1.4.0")
}

/// Connect a session to a simulated device
pub fn setup(device: &SimDevice, opts: SessionOptions) -> DeviceSession<SimTransport> {
    setup_logging();

    let t = device.transport(opts.frame_size, opts.channel);
    DeviceSession::connect(t, opts).expect("Session connect failed")
}

/// Record session states via a subscription
pub fn record(
    session: &DeviceSession<SimTransport>,
) -> (Arc<Mutex<Vec<DeviceSessionState>>>, Subscription) {
    let states = Arc::new(Mutex::new(vec![]));

    let s = states.clone();
    let sub = session.subscribe(move |v| s.lock().unwrap().push(v.clone()));

    (states, sub)
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use futures::StreamExt;

use ledger_dmk::{
    apdu::{frame::FrameError, os::GetAppAndVersion, Apdu, ApduResponse, StatusWord},
    ConcurrencyError, DeviceSession, DeviceSessionState, DeviceStatus, Error, SessionOptions,
};
use ledger_dmk_sim::SimDevice;

mod helpers;
use helpers::*;

fn ready(app: &str, version: &str, status: DeviceStatus) -> DeviceSessionState {
    DeviceSessionState::ReadyWithoutSecureChannel {
        status,
        current_app: app.to_string(),
        current_app_version: version.to_string(),
    }
}

#[tokio::test]
async fn send_command() -> anyhow::Result<()> {
    let d = device();
    let s = setup(&d, options());

    assert_eq!(
        s.state(),
        DeviceSessionState::Connected {
            status: DeviceStatus::Connected
        }
    );

    let app = s.send_command(&GetAppAndVersion).await?;
    assert_eq!(app.name, "BOLOS");

    // Raw APDUs are passed through
    let resp = s.send_apdu(&Apdu::empty(0xe0, 0x55, 0x00, 0x00)).await?;
    assert_eq!(resp.status(), StatusWord(0x6d00));

    assert_eq!(d.requests().len(), 2);

    Ok(())
}

#[tokio::test]
async fn small_frames() -> anyhow::Result<()> {
    let d = SimDevice::new().with_handler("Echo", "1.0.0", |a| {
        ApduResponse::new(a.data().to_vec(), StatusWord::SUCCESS)
    });
    d.set_current_app("Echo");

    // BLE sized frames
    let s = setup(
        &d,
        SessionOptions {
            frame_size: 20,
            ..options()
        },
    );

    let data: Vec<u8> = (0..=254).collect();
    let resp = s
        .send_apdu(&Apdu::new(0xe0, 0x02, 0x00, 0x00, data.clone())?)
        .await?;
    assert_eq!(resp.data(), &data[..]);

    Ok(())
}

#[tokio::test]
async fn invalid_options() {
    let d = device();
    let t = d.transport(64, 0x0101);

    let r = DeviceSession::connect(
        t,
        SessionOptions {
            frame_size: 7,
            ..options()
        },
    );
    assert!(matches!(
        r,
        Err(Error::Frame(FrameError::InvalidFrameSize(7)))
    ));
}

#[tokio::test(start_paused = true)]
async fn refresher_tracks_app() {
    let d = device();
    let s = setup(
        &d,
        SessionOptions {
            disable_refresher: false,
            ..options()
        },
    );
    let (states, _sub) = record(&s);

    // First refresh is immediate
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(s.state(), ready("BOLOS", "2.1.0", DeviceStatus::Connected));

    d.set_current_app("Bitcoin");
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(s.state(), ready("Bitcoin", "2.1.0", DeviceStatus::Connected));

    // Unchanged apps do not publish new states
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(
        &*states.lock().unwrap(),
        &[
            DeviceSessionState::Connected {
                status: DeviceStatus::Connected
            },
            ready("BOLOS", "2.1.0", DeviceStatus::Connected),
            ready("Bitcoin", "2.1.0", DeviceStatus::Connected),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn refresher_resilience() {
    let d = device();

    // First refresh fails
    d.fail_next(1);

    let s = setup(
        &d,
        SessionOptions {
            disable_refresher: false,
            ..options()
        },
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        s.state(),
        DeviceSessionState::Connected {
            status: DeviceStatus::Connected
        }
    );
    assert_eq!(d.count(0xb0, 0x01), 0);

    // Following refresh succeeds
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(s.state(), ready("BOLOS", "2.1.0", DeviceStatus::Connected));
    assert_eq!(d.count(0xb0, 0x01), 1);
}

#[tokio::test(start_paused = true)]
async fn refresher_disconnect() {
    let d = device();
    let s = setup(
        &d,
        SessionOptions {
            disable_refresher: false,
            ..options()
        },
    );

    d.disconnect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(s.state(), DeviceSessionState::Disconnected);

    let e = s.send_command(&GetAppAndVersion).await.unwrap_err();
    assert!(e.is_disconnected());
}

#[tokio::test(start_paused = true)]
async fn concurrent_exchange_rejected() -> anyhow::Result<()> {
    let d = device();
    d.set_latency(Duration::from_millis(100));

    let s = setup(&d, options());

    let s1 = s.clone();
    let h = tokio::spawn(async move { s1.send_command(&GetAppAndVersion).await });

    tokio::time::sleep(Duration::from_millis(10)).await;

    let e = s.send_command(&GetAppAndVersion).await.unwrap_err();
    assert!(matches!(
        e,
        Error::Concurrency(ConcurrencyError::ExchangeInFlight)
    ));

    // In-flight exchange is not affected
    let app = h.await??;
    assert_eq!(app.name, "BOLOS");
    assert_eq!(d.count(0xb0, 0x01), 1);

    // Session usable once the exchange completes
    let app = s.send_command(&GetAppAndVersion).await?;
    assert_eq!(app.name, "BOLOS");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn send_during_refresh_rejected() -> anyhow::Result<()> {
    let d = device();
    d.set_latency(Duration::from_millis(100));

    let s = setup(
        &d,
        SessionOptions {
            disable_refresher: false,
            ..options()
        },
    );

    // First refresh holds the channel
    tokio::time::sleep(Duration::from_millis(10)).await;
    let e = s.send_command(&GetAppAndVersion).await.unwrap_err();
    assert!(matches!(
        e,
        Error::Concurrency(ConcurrencyError::ExchangeInFlight)
    ));

    // Refresh completes well before the next tick
    tokio::time::sleep(Duration::from_millis(200)).await;
    let app = s.send_command(&GetAppAndVersion).await?;
    assert_eq!(app.name, "BOLOS");

    Ok(())
}

#[tokio::test]
async fn lock_tracking() {
    let d = device();
    let s = setup(&d, options());

    d.set_locked(true);
    let e = s.send_command(&GetAppAndVersion).await.unwrap_err();
    assert_eq!(e.status_word(), Some(StatusWord::LOCKED_DEVICE));
    assert_eq!(s.state().status(), DeviceStatus::Locked);

    d.set_locked(false);
    s.send_command(&GetAppAndVersion).await.unwrap();
    assert_eq!(s.state().status(), DeviceStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn exchange_timeout() -> anyhow::Result<()> {
    let d = SimDevice::new().with_handler("Echo", "1.0.0", |a| {
        ApduResponse::new(a.data().to_vec(), StatusWord::SUCCESS)
    });
    d.set_current_app("Echo");

    let s = setup(
        &d,
        SessionOptions {
            exchange_timeout_ms: Some(500),
            ..options()
        },
    );

    d.set_unresponsive(true);
    let e = s
        .send_apdu(&Apdu::new(0xe0, 0x02, 0x00, 0x00, vec![0x01])?)
        .await
        .unwrap_err();
    assert!(matches!(e, Error::Timeout));

    // Stale response is discarded by the next exchange
    d.set_unresponsive(false);
    let resp = s
        .send_apdu(&Apdu::new(0xe0, 0x02, 0x00, 0x00, vec![0x02])?)
        .await?;
    assert_eq!(resp.data(), &[0x02]);

    Ok(())
}

#[tokio::test]
async fn observe_and_close() -> anyhow::Result<()> {
    let d = device();
    let s = setup(&d, options());

    let (states, sub) = record(&s);
    let mut stream = Box::pin(s.state_stream());

    assert_eq!(
        stream.next().await,
        Some(DeviceSessionState::Connected {
            status: DeviceStatus::Connected
        })
    );

    s.send_command(&GetAppAndVersion).await?;

    s.close().await?;
    assert!(s.is_closed());

    // Closing twice is a no-op
    s.close().await?;

    assert_eq!(
        stream.next().await,
        Some(DeviceSessionState::Disconnected)
    );
    assert_eq!(stream.next().await, None);

    assert_eq!(
        states.lock().unwrap().last(),
        Some(&DeviceSessionState::Disconnected)
    );
    drop(sub);

    let e = s.send_command(&GetAppAndVersion).await.unwrap_err();
    assert!(matches!(e, Error::SessionClosed));

    Ok(())
}

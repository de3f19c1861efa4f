// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{convert::Infallible, time::Duration};

use futures::StreamExt;

use ledger_dmk::{
    apdu::{
        command::{decode_interruptible, decode_with, Interruptible},
        Apdu, ApduError, ApduResponse, Command, CommandResult, StatusWord,
    },
    ActionStep, CallTaskInAppDeviceAction, ConcurrencyError, DeviceActionRun, DeviceActionState,
    DeviceApi, DeviceSessionState, DeviceStatus, DeviceStatusOutput, Error,
    GetDeviceStatusDeviceAction, GoToDashboardDeviceAction, IntermediateValue, ListAppsDeviceAction, NavigationError, OpenAppDeviceAction,
    SendCommandInAppDeviceAction, SessionOptions, UserInteractionRequired,
};
use ledger_dmk_sim::SimDevice;

mod helpers;
use helpers::*;

const INS_PING: u8 = 0x02;
const INS_SIGN: u8 = 0x04;

/// Application ping, `E0 02 00 00 00`
#[derive(Copy, Clone, PartialEq, Debug)]
struct Ping;

impl Command for Ping {
    type Response = Vec<u8>;
    type ErrorCode = Infallible;

    fn encode(&self) -> Result<Apdu, ApduError> {
        Ok(Apdu::empty(0xe0, INS_PING, 0x00, 0x00))
    }

    fn decode(&self, resp: ApduResponse) -> CommandResult<Vec<u8>, Infallible> {
        decode_with(&resp, &[], |d| Ok(d.to_vec()))
    }
}

/// Two-part signing command, the device interrupts the first part to
/// request the second
#[derive(Copy, Clone, PartialEq, Debug)]
struct Sign {
    part: u8,
}

impl Command for Sign {
    type Response = Interruptible<Vec<u8>>;
    type ErrorCode = Infallible;

    fn encode(&self) -> Result<Apdu, ApduError> {
        Ok(Apdu::empty(0xe0, INS_SIGN, self.part, 0x00))
    }

    fn decode(&self, resp: ApduResponse) -> CommandResult<Interruptible<Vec<u8>>, Infallible> {
        decode_interruptible(resp, &[], |d| Ok(d.to_vec()))
    }
}

/// Simulated device with a Bitcoin app handling [Ping] and [Sign]
fn app_device() -> SimDevice {
    SimDevice::new()
        .with_handler("Bitcoin", "2.1.0", |a| match (a.ins(), a.p1()) {
            (INS_PING, _) => ApduResponse::new(b"pong".to_vec(), StatusWord::SUCCESS),
            (INS_SIGN, 0) => ApduResponse::new(vec![0x01], StatusWord::INTERRUPTED_EXECUTION),
            (INS_SIGN, 1) => ApduResponse::new(vec![0xaa, 0xbb], StatusWord::SUCCESS),
            _ => ApduResponse::new(vec![], 0x6d00),
        })
        .with_app("Ethereum", "1.10.3")
        .with_app("Solana", "1.4.0")
}

fn ping() -> SendCommandInAppDeviceAction<Ping> {
    SendCommandInAppDeviceAction::new("Bitcoin", Ping, UserInteractionRequired::SignTransaction)
}

fn pending(i: UserInteractionRequired, step: ActionStep) -> IntermediateValue {
    IntermediateValue {
        required_user_interaction: i,
        step,
    }
}

/// Collect pending states and the action result
async fn collect<O>(mut run: DeviceActionRun<O>) -> (Vec<IntermediateValue>, Result<O, Error>) {
    let mut states = vec![];

    while let Some(s) = run.next_state().await {
        match s {
            DeviceActionState::Pending(v) => states.push(v),
            DeviceActionState::Completed(o) => return (states, Ok(o)),
            DeviceActionState::Error(e) => return (states, Err(e)),
        }
    }

    panic!("Action ended without terminal state");
}

fn requests(d: &SimDevice) -> Vec<(u8, u8)> {
    d.requests().iter().map(|a| (a.cla(), a.ins())).collect()
}

#[tokio::test(start_paused = true)]
async fn open_app_and_run() -> anyhow::Result<()> {
    let d = app_device();
    let s = setup(&d, options());
    let (session_states, _sub) = record(&s);

    let run = s.execute_device_action(ping())?;
    let (states, r) = collect(run).await;

    assert_eq!(r?, b"pong".to_vec());
    assert_eq!(
        states,
        vec![
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::ConfirmOpenApp, ActionStep::OpenApp),
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::SignTransaction, ActionStep::Run),
        ]
    );
    assert_eq!(
        requests(&d),
        vec![(0xb0, 0x01), (0xe0, 0xd8), (0xb0, 0x01), (0xe0, INS_PING)]
    );

    // Session tracks the running app, busy while the action runs
    let ready = |app: &str, status| DeviceSessionState::ReadyWithoutSecureChannel {
        status,
        current_app: app.to_string(),
        current_app_version: "2.1.0".to_string(),
    };
    assert_eq!(
        &*session_states.lock().unwrap(),
        &[
            DeviceSessionState::Connected {
                status: DeviceStatus::Connected
            },
            DeviceSessionState::Connected {
                status: DeviceStatus::Busy
            },
            ready("BOLOS", DeviceStatus::Busy),
            ready("Bitcoin", DeviceStatus::Busy),
            ready("Bitcoin", DeviceStatus::Connected),
        ]
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn close_then_open() -> anyhow::Result<()> {
    let d = app_device();
    d.set_current_app("Ethereum");

    let s = setup(&d, options());

    let (states, r) = collect(s.execute_device_action(ping())?).await;
    assert_eq!(r?, b"pong".to_vec());

    assert_eq!(
        states,
        vec![
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::None, ActionStep::CloseApp),
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::ConfirmOpenApp, ActionStep::OpenApp),
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::SignTransaction, ActionStep::Run),
        ]
    );
    assert_eq!(
        requests(&d),
        vec![
            (0xb0, 0x01),
            (0xb0, 0xa7),
            (0xb0, 0x01),
            (0xe0, 0xd8),
            (0xb0, 0x01),
            (0xe0, INS_PING)
        ]
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn already_in_app() -> anyhow::Result<()> {
    let d = app_device();
    d.set_current_app("Bitcoin");

    let s = setup(
        &d,
        SessionOptions {
            disable_refresher: false,
            ..options()
        },
    );

    // Wait for the refresher to report the running app
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(s.state().current_app(), Some("Bitcoin"));
    d.clear_requests();

    let (states, r) = collect(s.execute_device_action(ping())?).await;
    assert_eq!(r?, b"pong".to_vec());

    // Navigation skipped for a known app
    assert_eq!(
        states,
        vec![pending(
            UserInteractionRequired::SignTransaction,
            ActionStep::Run
        )]
    );
    assert_eq!(requests(&d), vec![(0xe0, INS_PING)]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn app_not_installed() -> anyhow::Result<()> {
    let d = app_device();
    let s = setup(&d, options());

    let (_states, r) = collect(s.execute_device_action(OpenAppDeviceAction::new("Monero"))?).await;

    match r {
        Err(Error::Navigation(NavigationError::AppNotInstalled(name))) => {
            assert_eq!(name, "Monero")
        }
        r => panic!("Unexpected result: {:?}", r),
    }
    assert_eq!(d.current_app(), "BOLOS");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn open_refused() -> anyhow::Result<()> {
    let d = app_device();
    d.set_refuse_open(true);

    let s = setup(&d, options());

    let (states, r) = collect(s.execute_device_action(ping())?).await;

    assert!(matches!(
        r,
        Err(Error::Navigation(NavigationError::UserRefused))
    ));
    assert_eq!(
        states.last(),
        Some(&pending(
            UserInteractionRequired::ConfirmOpenApp,
            ActionStep::OpenApp
        ))
    );
    assert_eq!(d.count(0xe0, INS_PING), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn device_locked() -> anyhow::Result<()> {
    let d = app_device();
    d.set_locked(true);

    let s = setup(
        &d,
        SessionOptions {
            unlock_timeout_ms: 1000,
            ..options()
        },
    );

    // Lock detected while navigating, re-read until the unlock timeout
    let (states, r) = collect(s.execute_device_action(ping())?).await;
    assert!(matches!(
        r,
        Err(Error::Navigation(NavigationError::DeviceLocked))
    ));
    assert_eq!(
        states.first(),
        Some(&pending(UserInteractionRequired::None, ActionStep::FetchApp))
    );
    assert_eq!(
        &states[1..3],
        &[
            pending(UserInteractionRequired::UnlockDevice, ActionStep::WaitUnlock),
            pending(UserInteractionRequired::UnlockDevice, ActionStep::FetchApp),
        ]
    );
    assert_eq!(
        states.last(),
        Some(&pending(
            UserInteractionRequired::UnlockDevice,
            ActionStep::Failed
        ))
    );
    assert_eq!(states.len(), 22);
    assert_eq!(d.count(0xb0, 0x01), 11);
    assert_eq!(s.state().status(), DeviceStatus::Locked);

    // Known lock is confirmed with a fresh read rather than failing outright
    d.clear_requests();
    d.set_locked(false);

    let (states, r) = collect(s.execute_device_action(ping())?).await;
    assert_eq!(r?, b"pong".to_vec());
    assert_eq!(
        states[0],
        pending(UserInteractionRequired::UnlockDevice, ActionStep::FetchApp)
    );
    assert_eq!(requests(&d)[0], (0xb0, 0x01));
    assert_eq!(s.state().status(), DeviceStatus::Connected);
    assert_eq!(s.state().current_app(), Some("Bitcoin"));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unlocked_while_waiting() -> anyhow::Result<()> {
    let d = app_device();
    d.set_locked(true);

    let s = setup(&d, options());

    let d1 = d.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        d1.set_locked(false);
    });

    let (states, r) = collect(s.execute_device_action(ping())?).await;
    assert_eq!(r?, b"pong".to_vec());
    assert!(states.contains(&pending(
        UserInteractionRequired::UnlockDevice,
        ActionStep::WaitUnlock
    )));
    assert!(states.contains(&pending(
        UserInteractionRequired::ConfirmOpenApp,
        ActionStep::OpenApp
    )));
    assert_eq!(d.count(0xe0, INS_PING), 1);
    assert_eq!(s.state().status(), DeviceStatus::Connected);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn device_status() -> anyhow::Result<()> {
    let d = app_device();
    d.set_current_app("Ethereum");

    let s = setup(&d, options());

    // Runs in the open app without navigating
    let (states, r) = collect(s.execute_device_action(GetDeviceStatusDeviceAction::new())?).await;
    assert_eq!(
        r?,
        DeviceStatusOutput {
            current_app: "Ethereum".into(),
            current_app_version: "1.10.3".into(),
        }
    );
    assert_eq!(
        states,
        vec![
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::None, ActionStep::Run),
        ]
    );
    assert_eq!(requests(&d), vec![(0xb0, 0x01)]);
    assert_eq!(d.current_app(), "Ethereum");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn device_status_unlock() -> anyhow::Result<()> {
    let d = app_device();
    d.set_locked(true);

    let s = setup(&d, options());

    // Timeout overrides the session default
    let a = GetDeviceStatusDeviceAction::new().with_unlock_timeout(Duration::from_millis(300));
    let (states, r) = collect(s.execute_device_action(a)?).await;
    assert!(matches!(
        r,
        Err(Error::Navigation(NavigationError::DeviceLocked))
    ));
    assert_eq!(
        states.last(),
        Some(&pending(
            UserInteractionRequired::UnlockDevice,
            ActionStep::Failed
        ))
    );
    assert_eq!(d.count(0xb0, 0x01), 4);

    // Unlocked before the timeout
    let d1 = d.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        d1.set_locked(false);
    });

    let r = s
        .execute_device_action(GetDeviceStatusDeviceAction::new())?
        .result()
        .await?;
    assert_eq!(r.current_app, "BOLOS");
    assert_eq!(s.state().status(), DeviceStatus::Connected);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn panicking_action_releases_session() -> anyhow::Result<()> {
    let d = app_device();
    d.set_current_app("Bitcoin");

    let s = setup(&d, options());

    let a = CallTaskInAppDeviceAction::new(
        "Bitcoin",
        UserInteractionRequired::None,
        |_api: DeviceApi| async move {
            let fail = true;
            if fail {
                panic!("task failed");
            }
            Ok::<_, Error>(())
        },
    );

    let r = s.execute_device_action(a)?.result().await;
    assert!(matches!(r, Err(Error::Cancelled)));
    assert_eq!(s.state().status(), DeviceStatus::Connected);

    // Session accepts further actions and sends
    let r = s.execute_device_action(ping())?.result().await?;
    assert_eq!(r, b"pong".to_vec());
    assert_eq!(s.send_command(&Ping).await?, b"pong".to_vec());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn app_not_ready() -> anyhow::Result<()> {
    let d = app_device();
    d.set_launch_delay(10);

    let s = setup(
        &d,
        SessionOptions {
            navigation_retries: 2,
            ..options()
        },
    );

    let (_states, r) = collect(s.execute_device_action(ping())?).await;

    match r {
        Err(Error::Navigation(NavigationError::NotReady { expected, actual })) => {
            assert_eq!(expected, "Bitcoin");
            assert_eq!(actual, "BOLOS");
        }
        r => panic!("Unexpected result: {:?}", r),
    }

    // Initial fetch, post-open fetch, then one per retry
    assert_eq!(d.count(0xb0, 0x01), 4);
    assert_eq!(d.count(0xe0, INS_PING), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn app_settles() -> anyhow::Result<()> {
    let d = app_device();
    d.set_launch_delay(1);

    let s = setup(&d, options());

    let (states, r) = collect(s.execute_device_action(ping())?).await;
    assert_eq!(r?, b"pong".to_vec());

    assert_eq!(
        states,
        vec![
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::ConfirmOpenApp, ActionStep::OpenApp),
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::None, ActionStep::WaitRetry),
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::SignTransaction, ActionStep::Run),
        ]
    );
    assert_eq!(d.count(0xb0, 0x01), 3);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_during_delay() -> anyhow::Result<()> {
    let d = app_device();
    d.set_launch_delay(10);

    let s = setup(
        &d,
        SessionOptions {
            navigation_retry_delay_ms: 10_000,
            ..options()
        },
    );

    let start = tokio::time::Instant::now();
    let mut run = s.execute_device_action(ping())?;

    // Wait for the retry delay then cancel
    while let Some(v) = run.next_state().await {
        if let DeviceActionState::Pending(v) = v {
            if v.step == ActionStep::WaitRetry {
                run.cancel();
                break;
            }
        }
    }

    assert!(matches!(
        run.next_state().await,
        Some(DeviceActionState::Error(Error::Cancelled))
    ));
    assert!(run.next_state().await.is_none());
    assert!(start.elapsed() < Duration::from_secs(10));

    // Session released for the next action
    assert_eq!(s.state().status(), DeviceStatus::Connected);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_in_flight() -> anyhow::Result<()> {
    let d = app_device();
    d.set_current_app("Bitcoin");
    d.set_latency(Duration::from_secs(1));

    let s = setup(&d, options());

    let task = CallTaskInAppDeviceAction::new(
        "Bitcoin",
        UserInteractionRequired::None,
        |api: DeviceApi| async move {
            for _ in 0..3 {
                api.send_command(&Ping).await?;
            }
            Ok::<_, Error>(())
        },
    );
    let mut run = s.execute_device_action(task)?;

    while let Some(v) = run.next_state().await {
        if let DeviceActionState::Pending(v) = v {
            if v.step == ActionStep::Run {
                break;
            }
        }
    }

    // Cancel while the first task APDU is in flight
    tokio::time::sleep(Duration::from_millis(500)).await;
    run.cancel();

    assert!(matches!(run.result().await, Err(Error::Cancelled)));
    assert_eq!(d.count(0xe0, INS_PING), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn one_action_at_a_time() -> anyhow::Result<()> {
    let d = app_device();
    d.set_current_app("Bitcoin");
    d.set_latency(Duration::from_millis(100));

    let s = setup(&d, options());

    let run = s.execute_device_action(ping())?;
    assert_eq!(s.state().status(), DeviceStatus::Busy);

    assert!(matches!(
        s.execute_device_action(ping()),
        Err(Error::Concurrency(ConcurrencyError::ActionInProgress))
    ));
    assert!(matches!(
        s.send_apdu(&Apdu::empty(0xe0, INS_PING, 0x00, 0x00)).await,
        Err(Error::Concurrency(ConcurrencyError::ActionInProgress))
    ));

    assert_eq!(run.result().await?, b"pong".to_vec());
    assert_eq!(s.state().status(), DeviceStatus::Connected);

    // Next action accepted once the previous completes
    let run = s.execute_device_action(ping())?;
    assert_eq!(run.result().await?, b"pong".to_vec());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn list_apps() -> anyhow::Result<()> {
    let d = app_device();
    let s = setup(&d, options());

    let (states, r) = collect(s.execute_device_action(ListAppsDeviceAction)?).await;

    let names: Vec<_> = r?.into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec!["Bitcoin", "Ethereum", "Solana"]);

    assert_eq!(
        states,
        vec![
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::AllowListApps, ActionStep::Run),
        ]
    );
    assert_eq!(d.count(0xe0, 0xde), 1);
    assert_eq!(d.count(0xe0, 0xdf), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn interrupted_command() -> anyhow::Result<()> {
    let d = app_device();
    d.set_current_app("Bitcoin");

    let s = setup(&d, options());

    let task = CallTaskInAppDeviceAction::new(
        "Bitcoin",
        UserInteractionRequired::SignTransaction,
        |api: DeviceApi| async move {
            let mut part = 0;
            loop {
                match api.send_command(&Sign { part }).await? {
                    Interruptible::Complete(v) => return Ok::<_, Error>(v),
                    Interruptible::Interrupted(r) => {
                        assert_eq!(r.data(), &[0x01]);
                        part += 1;
                    }
                }
            }
        },
    );

    let r = s.execute_device_action(task)?.result().await?;
    assert_eq!(r, vec![0xaa, 0xbb]);
    assert_eq!(d.count(0xe0, INS_SIGN), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn go_to_dashboard() -> anyhow::Result<()> {
    let d = app_device();
    d.set_current_app("Ethereum");

    let s = setup(&d, options());

    let (states, r) = collect(s.execute_device_action(GoToDashboardDeviceAction)?).await;
    r?;

    assert_eq!(
        states,
        vec![
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::None, ActionStep::CloseApp),
            pending(UserInteractionRequired::None, ActionStep::FetchApp),
            pending(UserInteractionRequired::None, ActionStep::Run),
        ]
    );
    assert_eq!(d.current_app(), "BOLOS");
    assert_eq!(s.state().current_app(), Some("BOLOS"));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stream_ends_after_terminal() -> anyhow::Result<()> {
    let d = app_device();
    let s = setup(&d, options());

    let states: Vec<_> = s
        .execute_device_action(OpenAppDeviceAction::new("Solana"))?
        .collect()
        .await;

    assert_eq!(states.len(), 5);
    assert!(states[..4].iter().all(|v| !v.is_terminal()));
    assert!(matches!(states[4], DeviceActionState::Completed(())));

    assert_eq!(d.current_app(), "Solana");

    Ok(())
}

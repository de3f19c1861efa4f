// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device actions
//!
//! A [DeviceAction] describes an operation to run in a target application.
//! Executing an action via
//! [`DeviceSession::execute_device_action`][crate::DeviceSession::execute_device_action]
//! navigates to the target application using the core
//! [Engine][ledger_dmk_core::engine::Engine], runs the action body, and
//! streams [DeviceActionState]s to the caller via a [DeviceActionRun].

use std::{
    fmt::Debug,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use futures::Stream;
use log::{debug, warn};
use tokio::sync::mpsc;

use ledger_dmk_apdu::{
    os::{CloseApp, GetAppAndVersion, OpenApp},
    Apdu, ApduResponse, Command,
};
use ledger_dmk_core::{
    action::{DeviceActionState, IntermediateValue},
    engine::{Effect, Engine, Event, Failure, NavigationConfig, SessionSnapshot, State, Step},
    UserInteractionRequired,
};

use crate::{cancel::CancelToken, session::DeviceSessionState, Error};

mod command;
pub use command::{CallTaskInAppDeviceAction, SendCommandInAppDeviceAction};

mod list_apps;
pub use list_apps::ListAppsDeviceAction;

mod navigation;
pub use navigation::{GoToDashboardDeviceAction, OpenAppDeviceAction};

mod status;
pub use status::{DeviceStatusOutput, GetDeviceStatusDeviceAction};

/// State emitted by a running device action
pub type ActionState<O> = DeviceActionState<O, Error>;

/// Device action, run in a target application
#[async_trait]
pub trait DeviceAction: Send + Sync + 'static {
    /// Action output
    type Output: Send + 'static;

    /// Application the action must run in, `None` to run in whichever
    /// application is open
    fn app_name(&self) -> Option<&str>;

    /// User interaction required while the action body runs
    fn required_user_interaction(&self) -> UserInteractionRequired {
        UserInteractionRequired::None
    }

    /// Time to wait for a locked device to be unlocked, overriding the
    /// session default
    fn unlock_timeout(&self) -> Option<Duration> {
        None
    }

    /// Run the action body, once the target application is open
    async fn run(&self, api: &DeviceApi) -> Result<Self::Output, Error>;
}

/// Session operations available to running device actions
#[async_trait]
pub(crate) trait SessionPort: Send + Sync {
    /// Exchange an APDU, waiting for the channel if required
    async fn exchange(&self, apdu: &Apdu) -> Result<ApduResponse, Error>;

    fn state(&self) -> DeviceSessionState;

    fn set_state(&self, state: DeviceSessionState);

    /// Release the session for the next action
    fn action_finished(&self);
}

/// Device API bound to the session running an action
#[derive(Clone)]
pub struct DeviceApi {
    port: Arc<dyn SessionPort>,
    cancel: CancelToken,
}

impl DeviceApi {
    pub(crate) fn new(port: Arc<dyn SessionPort>, cancel: CancelToken) -> Self {
        Self { port, cancel }
    }

    /// Send a raw APDU, failing with [Error::Cancelled] once the action
    /// has been cancelled
    pub async fn send_apdu(&self, apdu: &Apdu) -> Result<ApduResponse, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.port.exchange(apdu).await
    }

    /// Send a [Command], decoding the response
    pub async fn send_command<C: Command + Sync>(&self, cmd: &C) -> Result<C::Response, Error> {
        let apdu = cmd.encode()?;
        let resp = self.send_apdu(&apdu).await?;

        Ok(cmd.decode(resp)?)
    }

    /// Fetch the current session state
    pub fn state(&self) -> DeviceSessionState {
        self.port.state()
    }

    /// Replace the session state
    pub fn set_state(&self, state: DeviceSessionState) {
        self.port.set_state(state)
    }

    /// Check whether the action has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Debug for DeviceApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceApi")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Running device action, streaming [DeviceActionState]s.
///
/// A run emits zero or more pending states followed by exactly one
/// terminal state, after which the stream ends.
pub struct DeviceActionRun<O> {
    rx: mpsc::UnboundedReceiver<ActionState<O>>,
    cancel: CancelToken,
    done: bool,
}

impl<O> Unpin for DeviceActionRun<O> {}

impl<O> DeviceActionRun<O> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ActionState<O>>, cancel: CancelToken) -> Self {
        Self {
            rx,
            cancel,
            done: false,
        }
    }

    /// Request cancellation.
    ///
    /// The action ends with [Error::Cancelled] once the in-flight exchange
    /// settles, navigation delays are interrupted immediately.
    pub fn cancel(&self) {
        self.cancel.cancel()
    }

    /// Await the next action state, `None` once the terminal state has
    /// been returned
    pub async fn next_state(&mut self) -> Option<ActionState<O>> {
        if self.done {
            return None;
        }

        let s = self.rx.recv().await;
        self.done = s.as_ref().map(|s| s.is_terminal()).unwrap_or(true);
        s
    }

    /// Await the action result, discarding pending states
    pub async fn result(mut self) -> Result<O, Error> {
        while let Some(s) = self.next_state().await {
            match s {
                DeviceActionState::Completed(o) => return Ok(o),
                DeviceActionState::Error(e) => return Err(e),
                DeviceActionState::Pending(_) => (),
            }
        }

        Err(Error::Cancelled)
    }
}

impl<O> Stream for DeviceActionRun<O> {
    type Item = ActionState<O>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(s)) => {
                this.done = s.is_terminal();
                Poll::Ready(Some(s))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// State emitter, ensuring exactly one terminal state per run and
/// releasing the session before that state is observable.
///
/// Dropping the emitter without a terminal state (the action task was
/// aborted or panicked) releases the session and emits [Error::Cancelled].
pub(crate) struct Emitter<O> {
    tx: mpsc::UnboundedSender<ActionState<O>>,
    port: Arc<dyn SessionPort>,
    done: bool,
}

impl<O> Emitter<O> {
    fn new(tx: mpsc::UnboundedSender<ActionState<O>>, port: Arc<dyn SessionPort>) -> Self {
        Self {
            tx,
            port,
            done: false,
        }
    }

    fn pending(&self, required_user_interaction: UserInteractionRequired, step: State) {
        // Receiver may have been dropped, the action runs to completion regardless
        let _ = self.tx.send(DeviceActionState::Pending(IntermediateValue {
            required_user_interaction,
            step,
        }));
    }

    fn terminal(mut self, s: ActionState<O>) {
        self.done = true;
        self.port.action_finished();
        let _ = self.tx.send(s);
    }
}

impl<O> Drop for Emitter<O> {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        warn!("Device action ended without a result, releasing session");
        self.port.action_finished();
        let _ = self.tx.send(DeviceActionState::Error(Error::Cancelled));
    }
}

/// Drive a device action to completion
pub(crate) async fn drive<A: DeviceAction>(
    action: A,
    api: DeviceApi,
    snapshot: SessionSnapshot,
    config: NavigationConfig,
    cancel: CancelToken,
    tx: mpsc::UnboundedSender<ActionState<A::Output>>,
) {
    let emitter = Emitter::new(tx, api.port.clone());

    let terminal = run(&action, &api, &snapshot, config, &cancel, &emitter).await;

    emitter.terminal(terminal);
}

/// Execute engine effects until a terminal step
async fn run<A: DeviceAction>(
    action: &A,
    api: &DeviceApi,
    snapshot: &SessionSnapshot,
    config: NavigationConfig,
    cancel: &CancelToken,
    emitter: &Emitter<A::Output>,
) -> ActionState<A::Output> {
    let required = action.required_user_interaction();
    let config = NavigationConfig {
        unlock_timeout: action.unlock_timeout().unwrap_or(config.unlock_timeout),
        ..config
    };
    let mut engine = match action.app_name() {
        Some(app) => Engine::<A::Output, Error>::new(app, required, config),
        None => Engine::any(required, config),
    };

    let mut step = engine.start(snapshot);

    loop {
        let effect = match step {
            Step::Effect(e) => e,
            Step::Done(o) => return DeviceActionState::Completed(o),
            Step::Failed(e) => {
                // Signal interaction required to recover, ie. unlocking the device
                if engine.interaction().is_required() {
                    emitter.pending(engine.interaction(), engine.state());
                }
                return DeviceActionState::Error(e.into());
            }
        };

        if cancel.is_cancelled() {
            return DeviceActionState::Error(Error::Cancelled);
        }

        emitter.pending(engine.interaction(), engine.state());
        debug!("Action step {}: {:?}", engine.state(), effect);

        let evt = match effect {
            Effect::GetAppAndVersion => {
                let r = api.send_command(&GetAppAndVersion).await;
                if let Ok(app) = &r {
                    api.set_state(api.state().with_app(&app.name, &app.version));
                }
                Event::AppAndVersion(r.map_err(failure))
            }
            Effect::CloseApp => Event::AppClosed(api.send_command(&CloseApp).await.map_err(failure)),
            Effect::OpenApp(name) => {
                Event::AppOpened(api.send_command(&OpenApp::new(name)).await.map_err(failure))
            }
            Effect::Delay(d) => {
                tokio::select! {
                    _ = tokio::time::sleep(d) => Event::Elapsed,
                    _ = cancel.cancelled() => return DeviceActionState::Error(Error::Cancelled),
                }
            }
            Effect::Run => Event::Ran(action.run(api).await),
        };

        if cancel.is_cancelled() {
            return DeviceActionState::Error(Error::Cancelled);
        }

        step = engine.update(evt);
    }
}

fn failure(e: Error) -> Failure<Error> {
    Failure::new(e.status_word(), e)
}

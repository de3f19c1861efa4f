// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device sessions
//!
//! A [DeviceSession] owns a single device connection, exchanging APDUs over an
//! [ApduChannel], tracking the [DeviceSessionState] and running a background
//! refresher to follow application changes on the device.

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex, MutexGuard,
    },
};

use async_trait::async_trait;
use futures::Stream;
use log::{debug, info};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use uuid::Uuid;

use ledger_dmk_apdu::{Apdu, ApduResponse, Command, StatusWord};

use crate::{
    action::{self, DeviceAction, DeviceActionRun, DeviceApi, SessionPort},
    cancel::CancelToken,
    channel::ApduChannel,
    error::ConcurrencyError,
    observer::{Observers, Subscription},
    transport::Transport,
    Error, SessionOptions,
};

mod refresher;

mod state;
pub use state::{DeviceSessionState, DeviceStatus};

/// Opaque session identifier, generated on connect
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a connected device session.
///
/// Handles are cheap to clone and share the underlying session.
pub struct DeviceSession<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for DeviceSession<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Running device action
struct ActionSlot {
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

/// Running refresher task
struct RefresherSlot {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

pub(crate) struct Inner<T: Transport> {
    id: SessionId,
    options: SessionOptions,
    channel: Mutex<ApduChannel<T>>,
    /// Device reported locked
    locked: AtomicBool,
    closed: AtomicBool,
    state: watch::Sender<DeviceSessionState>,
    observers: Observers<DeviceSessionState>,
    action: StdMutex<Option<ActionSlot>>,
    refresher: StdMutex<Option<RefresherSlot>>,
}

/// Lock a std mutex, ignoring poisoning
fn lock<V>(m: &StdMutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T: Transport> DeviceSession<T> {
    /// Connect a session over the provided transport, starting the
    /// background refresher unless disabled.
    ///
    /// Options are validated prior to use. This must be called from within
    /// a tokio runtime.
    pub fn connect(transport: T, options: SessionOptions) -> Result<Self, Error> {
        options.validate()?;

        let channel = ApduChannel::new(transport, options.frame_size, options.channel)?;
        let (state, _) = watch::channel(DeviceSessionState::Connected {
            status: DeviceStatus::Connected,
        });

        let inner = Arc::new(Inner {
            id: SessionId::new(),
            options,
            channel: Mutex::new(channel),
            locked: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            state,
            observers: Observers::default(),
            action: StdMutex::new(None),
            refresher: StdMutex::new(None),
        });

        info!("Connected session {}", inner.id);

        if !inner.options.disable_refresher {
            let cancel = CancelToken::new();
            let handle = refresher::spawn(
                Arc::downgrade(&inner),
                inner.options.refresh_interval(),
                cancel.clone(),
            );
            *lock(&inner.refresher) = Some(RefresherSlot { cancel, handle });
        }

        Ok(Self { inner })
    }

    /// Fetch the session id
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Fetch the session options
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    /// Fetch the current session state
    pub fn state(&self) -> DeviceSessionState {
        self.inner.state()
    }

    /// Subscribe to session state changes.
    ///
    /// The callback is invoked with the current state, then on every
    /// subsequent change until the returned [Subscription] is dropped.
    pub fn subscribe(
        &self,
        f: impl Fn(&DeviceSessionState) + Send + Sync + 'static,
    ) -> Subscription {
        let f = Arc::new(f);

        let g = f.clone();
        let s = self.inner.observers.subscribe(move |v| (*g)(v));

        (*f)(&self.inner.state());

        s
    }

    /// Stream session states, starting with the current state and ending
    /// once the session is disconnected.
    ///
    /// Intermediate states may be coalesced if the stream is not polled.
    pub fn state_stream(&self) -> impl Stream<Item = DeviceSessionState> + Send + 'static {
        let rx = self.inner.state.subscribe();

        futures::stream::unfold((rx, true, false), |(mut rx, first, done)| async move {
            if done || (!first && rx.changed().await.is_err()) {
                return None;
            }

            let s = rx.borrow_and_update().clone();
            let done = s.is_disconnected();

            Some((s, (rx, false, done)))
        })
    }

    /// Send a raw APDU to the device.
    ///
    /// This fails immediately with a concurrency error if a device action is
    /// running or any exchange is outstanding, including a background refresh.
    pub async fn send_apdu(&self, apdu: &Apdu) -> Result<ApduResponse, Error> {
        if self.inner.action_active() {
            return Err(ConcurrencyError::ActionInProgress.into());
        }

        self.inner.exchange(apdu, false).await
    }

    /// Send a [Command] to the device, decoding the response
    pub async fn send_command<C: Command + Sync>(&self, cmd: &C) -> Result<C::Response, Error> {
        let apdu = cmd.encode()?;
        let resp = self.send_apdu(&apdu).await?;

        Ok(cmd.decode(resp)?)
    }

    /// Execute a device action on this session.
    ///
    /// Returns a [DeviceActionRun] streaming action states, failing
    /// immediately if another action is running.
    pub fn execute_device_action<A: DeviceAction>(
        &self,
        action: A,
    ) -> Result<DeviceActionRun<A::Output>, Error> {
        let inner = &self.inner;

        if inner.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }

        let mut slot = lock(&inner.action);
        if slot.is_some() {
            return Err(ConcurrencyError::ActionInProgress.into());
        }

        debug!(
            "Session {} executing action in app {}",
            inner.id,
            action.app_name().unwrap_or("any")
        );

        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = inner.state().snapshot();

        let port: Arc<dyn SessionPort> = inner.clone();
        let api = DeviceApi::new(port, cancel.clone());

        let handle = tokio::spawn(action::drive(
            action,
            api,
            snapshot,
            inner.options.navigation(),
            cancel.clone(),
            tx,
        ));

        *slot = Some(ActionSlot {
            cancel: cancel.clone(),
            handle: Some(handle),
        });
        drop(slot);

        inner.update_status();

        Ok(DeviceActionRun::new(rx, cancel))
    }

    /// Close the session.
    ///
    /// This stops the refresher, cancels any running device action, publishes
    /// [DeviceSessionState::Disconnected], removes all observers then
    /// disconnects the transport. Closing a closed session is a no-op.
    pub async fn close(&self) -> Result<(), Error> {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing session {}", inner.id);

        if let Some(r) = lock(&inner.refresher).take() {
            r.cancel.cancel();
            r.handle.abort();
        }

        if let Some(a) = lock(&inner.action).take() {
            a.cancel.cancel();
            if let Some(h) = a.handle {
                h.abort();
            }
        }

        inner.update_state(|_| DeviceSessionState::Disconnected);
        inner.observers.clear();

        let mut ch = inner.channel.lock().await;
        ch.disconnect().await
    }

    /// Check whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl<T: Transport> Inner<T> {
    fn state(&self) -> DeviceSessionState {
        self.state.borrow().clone()
    }

    /// Replace the session state, notifying observers on change.
    ///
    /// [DeviceSessionState::Disconnected] is final.
    fn update_state(&self, f: impl FnOnce(&DeviceSessionState) -> DeviceSessionState) {
        let mut next = None;

        self.state.send_if_modified(|s| {
            if s.is_disconnected() {
                return false;
            }

            let n = f(s);
            if n == *s {
                return false;
            }

            *s = n.clone();
            next = Some(n);
            true
        });

        if let Some(n) = next {
            debug!("Session {} state: {:?}", self.id, n);
            self.observers.notify(&n);
        }
    }

    fn action_active(&self) -> bool {
        lock(&self.action).is_some()
    }

    /// Compute the device status from lock and action tracking
    fn status(&self) -> DeviceStatus {
        if self.locked.load(Ordering::SeqCst) {
            DeviceStatus::Locked
        } else if self.action_active() {
            DeviceStatus::Busy
        } else {
            DeviceStatus::Connected
        }
    }

    fn update_status(&self) {
        let status = self.status();
        self.update_state(|s| s.with_status(status));
    }

    /// Track device lock state from a response status word
    fn track_lock(&self, sw: StatusWord) {
        let locked = sw == StatusWord::LOCKED_DEVICE;
        if self.locked.swap(locked, Ordering::SeqCst) != locked {
            info!("Session {} device locked: {}", self.id, locked);
            self.update_status();
        }
    }

    /// Exchange an APDU, waiting for the channel or failing if busy
    async fn exchange(&self, apdu: &Apdu, wait: bool) -> Result<ApduResponse, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }

        let mut ch = match wait {
            true => self.channel.lock().await,
            false => self
                .channel
                .try_lock()
                .map_err(|_| ConcurrencyError::ExchangeInFlight)?,
        };

        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }

        let r = match self.options.exchange_timeout() {
            Some(t) => tokio::time::timeout(t, ch.exchange(apdu))
                .await
                .unwrap_or_else(|e| Err(Error::from(e))),
            None => ch.exchange(apdu).await,
        };
        drop(ch);

        match &r {
            Ok(resp) => self.track_lock(resp.status()),
            Err(e) if e.is_disconnected() => {
                info!("Session {} device disconnected", self.id);
                self.update_state(|_| DeviceSessionState::Disconnected);
            }
            Err(e) => debug!("Session {} exchange failed: {}", self.id, e),
        }

        r
    }
}

#[async_trait]
impl<T: Transport> SessionPort for Inner<T> {
    async fn exchange(&self, apdu: &Apdu) -> Result<ApduResponse, Error> {
        Inner::exchange(self, apdu, true).await
    }

    fn state(&self) -> DeviceSessionState {
        Inner::state(self)
    }

    fn set_state(&self, state: DeviceSessionState) {
        self.update_state(|_| state)
    }

    fn action_finished(&self) {
        lock(&self.action).take();
        self.update_status();
    }
}

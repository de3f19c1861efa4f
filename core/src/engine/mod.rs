// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] sequences device actions.
//!
//! Each action runs in a target application. The engine checks the session
//! state, navigates to the target application (closing the running app to reach
//! the dashboard, then opening the target) and finally runs the action body.
//!
//! A locked device is not a permanent failure. The engine re-reads the running
//! application at the retry interval until the device is unlocked or the unlock
//! timeout elapses.
//!
//! The engine performs no I/O. [`Engine::update`] consumes an [Event] and
//! returns a [Step], either an [Effect] for the caller to execute or a terminal
//! result. See `ledger-dmk` for the driver executing effects against a session.

use alloc::string::{String, ToString};
use core::{marker::PhantomData, time::Duration};

use strum::{Display, EnumIter, EnumString};

use ledger_dmk_apdu::{os::is_dashboard, GlobalErrorCode, StatusWord};

use crate::interaction::UserInteractionRequired;

mod event;
pub use event::{Event, Failure};

mod output;
pub use output::{Effect, Step};

mod error;
pub use error::{ActionError, NavigationError};

/// Engine internal state enumeration
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumString, Display, EnumIter)]
pub enum State {
    /// Not yet started
    Init,
    /// Reading the running application
    FetchApp,
    /// Closing the running application
    CloseApp,
    /// Opening the target application
    OpenApp,
    /// Waiting before re-reading the running application
    WaitRetry,
    /// Waiting for the user to unlock the device
    WaitUnlock,
    /// Running the action body
    Run,
    /// Action complete
    Complete,
    /// Action failed
    Failed,
}

/// Navigation configuration
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct NavigationConfig {
    /// Maximum re-reads while waiting for an application switch to settle
    pub max_retries: u8,
    /// Delay between re-reads
    pub retry_delay: Duration,
    /// Maximum time to wait for the device to be unlocked
    pub unlock_timeout: Duration,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            unlock_timeout: Duration::from_secs(15),
        }
    }
}

/// Session state known when the action starts
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct SessionSnapshot {
    /// Device reported locked
    pub locked: bool,
    /// Running application, if known
    pub current_app: Option<String>,
}

/// Application expected after a navigation step
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Expect {
    Dashboard,
    Target,
}

/// [Engine] sequences navigation and execution for a single action run
#[derive(Clone, Debug)]
pub struct Engine<O, E> {
    state: State,
    target: Option<String>,
    interaction: UserInteractionRequired,
    required: UserInteractionRequired,
    config: NavigationConfig,
    expect: Option<Expect>,
    retries: u8,
    unlocking: bool,
    unlock_waited: Duration,
    _p: PhantomData<fn() -> (O, E)>,
}

impl<O, E> Engine<O, E> {
    /// Create a new engine for an action running in `target`, requiring
    /// `required` user interaction while the action body runs
    pub fn new(
        target: impl Into<String>,
        required: UserInteractionRequired,
        config: NavigationConfig,
    ) -> Self {
        Self::with_target(Some(target.into()), required, config)
    }

    /// Create a new engine for an action running in whichever application is
    /// open. The running application is always re-read before the body runs.
    pub fn any(required: UserInteractionRequired, config: NavigationConfig) -> Self {
        Self::with_target(None, required, config)
    }

    fn with_target(
        target: Option<String>,
        required: UserInteractionRequired,
        config: NavigationConfig,
    ) -> Self {
        Self {
            state: State::Init,
            target,
            interaction: UserInteractionRequired::None,
            required,
            config,
            expect: None,
            retries: 0,
            unlocking: false,
            unlock_waited: Duration::ZERO,
            _p: PhantomData,
        }
    }

    /// Current engine state
    pub fn state(&self) -> State {
        self.state
    }

    /// Target application, `None` if the action runs in any application
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// User interaction required for the current state
    pub fn interaction(&self) -> UserInteractionRequired {
        self.interaction
    }

    /// Start the action from a snapshot of the session state
    pub fn start(&mut self, snapshot: &SessionSnapshot) -> Step<O, E> {
        if self.state != State::Init {
            return self.fail(NavigationError::UnexpectedEvent(self.state));
        }

        // Last seen locked, confirm with a fresh read
        if snapshot.locked {
            self.unlocking = true;
            return self.fetch_app();
        }

        match (self.target.is_some(), &snapshot.current_app) {
            (true, Some(app)) => self.plan(app),
            _ => self.fetch_app(),
        }
    }

    /// Handle the result of an executed [Effect]
    pub fn update(&mut self, evt: Event<O, E>) -> Step<O, E> {
        let prev = self.state;

        let step = match (self.state, evt) {
            (State::FetchApp, Event::AppAndVersion(Ok(app))) => {
                self.unlocking = false;
                self.on_app(&app.name)
            }
            (State::FetchApp, Event::AppAndVersion(Err(f))) => self.on_failure(f),

            (State::CloseApp, Event::AppClosed(Ok(()))) => {
                self.expect = Some(Expect::Dashboard);
                self.fetch_app()
            }
            (State::CloseApp, Event::AppClosed(Err(f))) => self.on_failure(f),

            (State::OpenApp, Event::AppOpened(Ok(()))) => {
                self.expect = Some(Expect::Target);
                self.fetch_app()
            }
            (State::OpenApp, Event::AppOpened(Err(f))) => self.on_open_failure(f),

            (State::WaitRetry, Event::Elapsed) => self.fetch_app(),
            (State::WaitUnlock, Event::Elapsed) => self.fetch_app(),

            (State::Run, Event::Ran(Ok(o))) => {
                self.state = State::Complete;
                self.interaction = UserInteractionRequired::None;
                Step::Done(o)
            }
            (State::Run, Event::Ran(Err(e))) => {
                self.state = State::Failed;
                self.interaction = UserInteractionRequired::None;
                Step::Failed(ActionError::Step(e))
            }

            (s, _) => self.fail(NavigationError::UnexpectedEvent(s)),
        };

        #[cfg(feature = "log")]
        if prev != self.state {
            log::debug!("action state: {} -> {}", prev, self.state);
        }
        #[cfg(not(feature = "log"))]
        let _ = prev;

        step
    }

    /// Check whether an application name matches the target
    fn is_target(&self, app: &str) -> bool {
        match self.target.as_deref() {
            None => true,
            Some(t) if is_dashboard(t) => is_dashboard(app),
            Some(t) => app == t,
        }
    }

    fn target_name(&self) -> String {
        self.target.clone().unwrap_or_default()
    }

    /// Handle a running application report
    fn on_app(&mut self, app: &str) -> Step<O, E> {
        let expected = match self.expect.take() {
            Some(Expect::Dashboard) => is_dashboard(app),
            Some(Expect::Target) => self.is_target(app),
            None => true,
        };

        // Application switch has not settled yet
        if !expected && !self.is_target(app) {
            return self.retry(app);
        }

        self.plan(app)
    }

    /// Select the next navigation step for the running application
    fn plan(&mut self, app: &str) -> Step<O, E> {
        if self.is_target(app) {
            self.state = State::Run;
            self.interaction = self.required;
            return Step::Effect(Effect::Run);
        }

        if is_dashboard(app) {
            self.state = State::OpenApp;
            self.interaction = UserInteractionRequired::ConfirmOpenApp;
            return Step::Effect(Effect::OpenApp(self.target_name()));
        }

        self.state = State::CloseApp;
        self.interaction = UserInteractionRequired::None;
        Step::Effect(Effect::CloseApp)
    }

    /// Schedule a re-read of the running application
    fn retry(&mut self, actual: &str) -> Step<O, E> {
        if self.retries >= self.config.max_retries {
            return self.fail(NavigationError::NotReady {
                expected: self.target_name(),
                actual: actual.to_string(),
            });
        }

        // Keep waiting for the same application
        self.expect = match is_dashboard(actual) {
            true => Some(Expect::Target),
            false => Some(Expect::Dashboard),
        };
        self.retries += 1;

        self.state = State::WaitRetry;
        self.interaction = UserInteractionRequired::None;
        Step::Effect(Effect::Delay(self.config.retry_delay))
    }

    fn fetch_app(&mut self) -> Step<O, E> {
        self.state = State::FetchApp;
        self.interaction = match self.unlocking {
            true => UserInteractionRequired::UnlockDevice,
            false => UserInteractionRequired::None,
        };
        Step::Effect(Effect::GetAppAndVersion)
    }

    fn on_failure(&mut self, f: Failure<E>) -> Step<O, E> {
        if f.status == Some(StatusWord::LOCKED_DEVICE) {
            return self.locked();
        }

        self.state = State::Failed;
        self.interaction = UserInteractionRequired::None;
        Step::Failed(ActionError::Step(f.error))
    }

    fn on_open_failure(&mut self, f: Failure<E>) -> Step<O, E> {
        match f.status.and_then(|s| s.global()) {
            Some(GlobalErrorCode::UserRefusedOnDevice)
            | Some(GlobalErrorCode::ConditionsNotSatisfied) => {
                return self.fail(NavigationError::UserRefused)
            }
            _ => (),
        }

        if f.status == Some(StatusWord(0x6807)) {
            let app = self.target_name();
            return self.fail(NavigationError::AppNotInstalled(app));
        }

        self.on_failure(f)
    }

    /// Handle a locked device response, waiting for the user to unlock
    fn locked(&mut self) -> Step<O, E> {
        self.interaction = UserInteractionRequired::UnlockDevice;

        if self.unlock_waited >= self.config.unlock_timeout {
            self.state = State::Failed;
            return Step::Failed(ActionError::Navigation(NavigationError::DeviceLocked));
        }

        self.unlocking = true;
        self.unlock_waited += self.config.retry_delay;

        self.state = State::WaitUnlock;
        Step::Effect(Effect::Delay(self.config.retry_delay))
    }

    fn fail(&mut self, e: NavigationError) -> Step<O, E> {
        self.state = State::Failed;
        self.interaction = UserInteractionRequired::None;
        Step::Failed(ActionError::Navigation(e))
    }
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::debug;

use ledger_dmk_apdu::{
    encode_to_vec,
    os::{
        encode_page, is_dashboard, AppAndVersion, AppEntry, CloseApp, GetAppAndVersion, OpenApp,
        BOLOS_CLA, DASHBOARD_APP_NAME, OS_CLA,
    },
    Apdu, ApduResponse, ApduStatic, GlobalErrorCode, StatusWord,
};

use crate::SimTransport;

/// Application APDU handler
pub type Handler = Arc<dyn Fn(&Apdu) -> ApduResponse + Send + Sync>;

/// Applications returned per `ListApps` page
pub const LIST_PAGE_SIZE: usize = 2;

const INS_LIST_FIRST: u8 = 0xde;
const INS_LIST_NEXT: u8 = 0xdf;

const SW_APP_NOT_FOUND: u16 = 0x6807;
const SW_NO_APP_NAME: u16 = 0x670a;

const DASHBOARD_VERSION: &str = "2.1.0";

struct SimApp {
    version: String,
    entry: AppEntry,
    handler: Option<Handler>,
}

pub(crate) struct SimState {
    apps: Vec<SimApp>,
    current_app: String,
    current_version: String,
    /// Polls reporting the dashboard after an app is opened
    launch_delay: usize,
    launching: usize,
    list_cursor: usize,
    locked: bool,
    refuse_open: bool,
    pub(crate) fail_next: usize,
    pub(crate) latency: Duration,
    pub(crate) unresponsive: bool,
    pub(crate) disconnected: bool,
    requests: Vec<Apdu>,
}

/// Simulated device, shared between test code and [SimTransport]s
#[derive(Clone)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    /// Create a simulated device running the dashboard with no applications
    /// installed
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                apps: vec![],
                current_app: DASHBOARD_APP_NAME.to_string(),
                current_version: DASHBOARD_VERSION.to_string(),
                launch_delay: 0,
                launching: 0,
                list_cursor: 0,
                locked: false,
                refuse_open: false,
                fail_next: 0,
                latency: Duration::ZERO,
                unresponsive: false,
                disconnected: false,
                requests: vec![],
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install an application
    pub fn with_app(self, name: &str, version: &str) -> Self {
        self.install(name, version, None);
        self
    }

    /// Install an application with an APDU handler
    pub fn with_handler(
        self,
        name: &str,
        version: &str,
        handler: impl Fn(&Apdu) -> ApduResponse + Send + Sync + 'static,
    ) -> Self {
        self.install(name, version, Some(Arc::new(handler)));
        self
    }

    fn install(&self, name: &str, version: &str, handler: Option<Handler>) {
        let mut s = self.lock();

        let n = s.apps.len() as u8;
        s.apps.push(SimApp {
            version: version.to_string(),
            entry: AppEntry {
                blocks: 0x0010 + n as u16,
                flags: 0x0a00,
                code_hash: [n; 32],
                full_hash: [!n; 32],
                name: name.to_string(),
            },
            handler,
        });
    }

    /// Create a transport connected to this device
    pub fn transport(&self, frame_size: usize, channel: u16) -> SimTransport {
        SimTransport::new(self.clone(), frame_size, channel)
    }

    /// Set the running application (without prompting)
    pub fn set_current_app(&self, name: &str) {
        let mut s = self.lock();

        let version = s
            .apps
            .iter()
            .find(|a| a.entry.name == name)
            .map(|a| a.version.clone())
            .unwrap_or_else(|| DASHBOARD_VERSION.to_string());

        s.current_app = name.to_string();
        s.current_version = version;
        s.launching = 0;
    }

    /// Fetch the running application
    pub fn current_app(&self) -> String {
        self.lock().current_app.clone()
    }

    /// Lock or unlock the device, locked devices respond to all APDUs with `5515`
    pub fn set_locked(&self, locked: bool) {
        self.lock().locked = locked;
    }

    /// Refuse `OpenApp` prompts
    pub fn set_refuse_open(&self, refuse: bool) {
        self.lock().refuse_open = refuse;
    }

    /// Report the dashboard for `n` polls after opening an application
    pub fn set_launch_delay(&self, n: usize) {
        self.lock().launch_delay = n;
    }

    /// Fail the next `n` frame writes with a transport error
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Delay each frame read
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Stop responding to requests
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.lock().unresponsive = unresponsive;
    }

    /// Disconnect the device, failing all transport operations
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    /// Fetch APDUs received by the device
    pub fn requests(&self) -> Vec<Apdu> {
        self.lock().requests.clone()
    }

    /// Count received APDUs with the provided class and instruction
    pub fn count(&self, cla: u8, ins: u8) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|a| a.cla() == cla && a.ins() == ins)
            .count()
    }

    /// Clear the received APDU log
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }
}

impl SimState {
    /// Handle an APDU, returning the device response
    pub(crate) fn handle(&mut self, apdu: &Apdu) -> ApduResponse {
        debug!("Sim handling {}", apdu);
        self.requests.push(apdu.clone());

        if self.locked {
            return status(StatusWord::LOCKED_DEVICE);
        }

        let dashboard = is_dashboard(&self.current_app);

        match (apdu.cla(), apdu.ins()) {
            (BOLOS_CLA, GetAppAndVersion::INS) => self.app_and_version(),
            (BOLOS_CLA, CloseApp::INS) => {
                self.set_app(DASHBOARD_APP_NAME, DASHBOARD_VERSION);
                status(StatusWord::SUCCESS)
            }
            (OS_CLA, OpenApp::INS) if dashboard => self.open_app(apdu.data()),
            (OS_CLA, INS_LIST_FIRST) if dashboard => {
                self.list_cursor = 0;
                self.list_page()
            }
            (OS_CLA, INS_LIST_NEXT) if dashboard => self.list_page(),
            (OS_CLA, _) if dashboard => global(GlobalErrorCode::InstructionNotSupported),
            _ if dashboard => global(GlobalErrorCode::ClassNotSupported),
            _ => match self.handler() {
                Some(h) => (*h)(apdu),
                None => global(GlobalErrorCode::InstructionNotSupported),
            },
        }
    }

    fn handler(&self) -> Option<Handler> {
        self.apps
            .iter()
            .find(|a| a.entry.name == self.current_app)
            .and_then(|a| a.handler.clone())
    }

    fn set_app(&mut self, name: &str, version: &str) {
        self.current_app = name.to_string();
        self.current_version = version.to_string();
    }

    fn app_and_version(&mut self) -> ApduResponse {
        // Application still launching
        let a = match self.launching {
            0 => AppAndVersion::new(&self.current_app, &self.current_version),
            _ => {
                self.launching -= 1;
                AppAndVersion::new(DASHBOARD_APP_NAME, DASHBOARD_VERSION)
            }
        };

        match encode_to_vec(&a) {
            Ok(b) => ApduResponse::new(b, StatusWord::SUCCESS),
            Err(_) => global(GlobalErrorCode::TechnicalProblem),
        }
    }

    fn open_app(&mut self, name: &[u8]) -> ApduResponse {
        let name = match core::str::from_utf8(name) {
            Ok(v) if v.is_empty() => return status(StatusWord(SW_NO_APP_NAME)),
            Ok(v) => v.to_string(),
            Err(_) => return global(GlobalErrorCode::InvalidData),
        };

        let version = match self.apps.iter().find(|a| a.entry.name == name) {
            Some(a) => a.version.clone(),
            None => return status(StatusWord(SW_APP_NOT_FOUND)),
        };

        if self.refuse_open {
            return global(GlobalErrorCode::UserRefusedOnDevice);
        }

        self.set_app(&name, &version);
        self.launching = self.launch_delay;

        status(StatusWord::SUCCESS)
    }

    fn list_page(&mut self) -> ApduResponse {
        let start = self.list_cursor.min(self.apps.len());
        let end = (start + LIST_PAGE_SIZE).min(self.apps.len());

        let page: Vec<_> = self.apps[start..end].iter().map(|a| a.entry.clone()).collect();
        self.list_cursor = end;

        match encode_page(&page) {
            Ok(b) => ApduResponse::new(b, StatusWord::SUCCESS),
            Err(_) => global(GlobalErrorCode::TechnicalProblem),
        }
    }
}

fn status(sw: StatusWord) -> ApduResponse {
    ApduResponse::new(vec![], sw)
}

fn global(code: GlobalErrorCode) -> ApduResponse {
    status(code.status())
}

// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Management of multiple device sessions

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use log::debug;

use crate::{
    session::{DeviceSession, SessionId},
    transport::Transport,
    Error, SessionOptions,
};

/// Session manager, tracking connected sessions by [SessionId].
///
/// Sessions are independent, closing or failing one session does not
/// affect others. Sessions disconnected by the device are dropped from the
/// manager on the next lookup.
pub struct SessionManager<T: Transport> {
    options: SessionOptions,
    sessions: Mutex<HashMap<SessionId, DeviceSession<T>>>,
}

impl<T: Transport> Default for SessionManager<T> {
    fn default() -> Self {
        Self {
            options: SessionOptions::default(),
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Transport> SessionManager<T> {
    /// Create a new session manager using the provided options for
    /// new sessions
    pub fn new(options: SessionOptions) -> Result<Self, Error> {
        options.validate()?;

        Ok(Self {
            options,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, DeviceSession<T>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the session map, dropping sessions the device has disconnected
    fn live_sessions(&self) -> MutexGuard<'_, HashMap<SessionId, DeviceSession<T>>> {
        let mut sessions = self.sessions();

        sessions.retain(|id, s| {
            let live = !s.state().is_disconnected();
            if !live {
                debug!("Removing disconnected session {}", id);
            }
            live
        });

        sessions
    }

    /// Connect a new session over the provided transport
    pub fn connect(&self, transport: T) -> Result<DeviceSession<T>, Error> {
        let s = DeviceSession::connect(transport, self.options.clone())?;

        debug!("Registered session {}", s.id());
        self.live_sessions().insert(s.id(), s.clone());

        Ok(s)
    }

    /// Fetch a session by id
    pub fn get(&self, id: &SessionId) -> Option<DeviceSession<T>> {
        self.live_sessions().get(id).cloned()
    }

    /// List connected session ids
    pub fn list(&self) -> Vec<SessionId> {
        self.live_sessions().keys().copied().collect()
    }

    /// Close and remove a session
    pub async fn close(&self, id: &SessionId) -> Result<(), Error> {
        let s = self.sessions().remove(id).ok_or(Error::UnknownSession(*id))?;

        s.close().await
    }

    /// Close and remove all sessions
    pub async fn close_all(&self) {
        let sessions: Vec<_> = self.sessions().drain().map(|(_, s)| s).collect();

        for s in sessions {
            if let Err(e) = s.close().await {
                debug!("Failed to close session {}: {}", s.id(), e);
            }
        }
    }
}

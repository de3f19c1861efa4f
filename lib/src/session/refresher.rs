// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Background session refresh, polling the running application

use std::{sync::Weak, time::Duration};

use log::{debug, trace, warn};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use ledger_dmk_apdu::{os::GetAppAndVersion, Command};

use super::Inner;
use crate::{cancel::CancelToken, transport::Transport, Error};

/// Spawn the refresher task for a session.
///
/// The task holds a weak session reference and exits once the session is
/// dropped, cancelled, or the device disconnects. Other failures are logged
/// and restart the refresh schedule.
pub(super) fn spawn<T: Transport>(
    session: Weak<Inner<T>>,
    period: Duration,
    cancel: CancelToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => (),
            }

            let inner = match session.upgrade() {
                Some(v) => v,
                None => break,
            };

            match inner.refresh().await {
                Ok(()) => (),
                Err(e) if e.is_disconnected() => {
                    warn!("Session {} refresh stopped: {}", inner.id, e);
                    break;
                }
                Err(Error::SessionClosed) => break,
                Err(e) => {
                    warn!("Session {} refresh failed: {}", inner.id, e);
                    ticker.reset();
                }
            }
        }

        debug!("Refresher exit");
    })
}

impl<T: Transport> Inner<T> {
    /// Read the running application, publishing a new state on change.
    ///
    /// Skipped while a device action or another exchange is in progress.
    pub(super) async fn refresh(&self) -> Result<(), Error> {
        if self.action_active() {
            trace!("Session {} busy, skipping refresh", self.id);
            return Ok(());
        }

        let apdu = Command::encode(&GetAppAndVersion)?;
        let resp = match self.exchange(&apdu, false).await {
            Ok(r) => r,
            Err(Error::Concurrency(_)) => {
                trace!("Session {} exchange in flight, skipping refresh", self.id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let app = Command::decode(&GetAppAndVersion, resp)?;
        self.update_state(|s| s.with_app(&app.name, &app.version));

        Ok(())
    }
}

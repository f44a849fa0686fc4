//! Periodic session re-verification.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::client::SessionClient;
use crate::events::Event;

/// Handle to the auto-verify background task
pub(crate) struct AutoVerify {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoVerify {
    pub(crate) fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Cancel any running timer and arm a new one
    pub(crate) fn start(&self, client: SessionClient, period: Duration) {
        let mut slot = self.handle.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(run(client, period)));
    }

    /// Returns whether a timer was running
    pub(crate) fn stop(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

async fn run(client: SessionClient, period: Duration) {
    // First check fires one full period after start
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !client.is_logged_in() {
            debug!("Auto-verify tick skipped, not logged in");
            continue;
        }
        // verify_session has already cleared the store on failure
        if !client.verify_session().await {
            info!("Session no longer valid");
            client.emit(Event::Logout);
        }
    }
}

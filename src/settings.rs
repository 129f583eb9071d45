//! Settings watcher
//!
//! Polls the stored configuration and hands the new [`Settings`] to every
//! pending one-shot subscriber when the serialized settings change. The
//! very first check always counts as a change.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;

use crate::error::TrackerError;
use crate::state::ConfigStore;
use crate::types::Settings;

#[derive(Default)]
struct WatcherState {
    last_snapshot: Option<String>,
    subscribers: Vec<oneshot::Sender<Settings>>,
}

pub struct SettingsWatcher {
    store: Arc<dyn ConfigStore>,
    state: Mutex<WatcherState>,
}

impl SettingsWatcher {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            state: Mutex::new(WatcherState::default()),
        }
    }

    /// Register for the next change. Fires at most once.
    pub fn subscribe(&self) -> oneshot::Receiver<Settings> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().subscribers.push(tx);
        rx
    }

    /// One poll of the store. Returns true when subscribers were notified.
    pub fn check(&self) -> Result<bool, TrackerError> {
        let settings = self.store.load()?.settings();
        let snapshot = serde_json::to_string(&settings)?;

        let subscribers = {
            let mut state = self.state.lock();
            if state.last_snapshot.as_deref() == Some(snapshot.as_str()) {
                return Ok(false);
            }
            state.last_snapshot = Some(snapshot);
            std::mem::take(&mut state.subscribers)
        };

        log::debug!(
            "Settings watcher: settings changed, notifying {} subscriber(s)",
            subscribers.len()
        );
        for tx in subscribers {
            // Receiver may have given up waiting
            let _ = tx.send(settings.clone());
        }

        Ok(true)
    }

    /// Poll every `period` until `shutdown` flips.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.check() {
                        log::warn!("Settings watcher: failed to read settings: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    log::debug!("Settings watcher: stopping");
                    return;
                }
            }
        }
    }

    /// Resolve once the stored settings carry both host and API key.
    ///
    /// Returns immediately when they already do; otherwise waits for
    /// changes delivered by [`SettingsWatcher::run`].
    pub async fn wait_for_credentials(&self) -> Result<Settings, TrackerError> {
        loop {
            // Subscribe before reading so a change in between is not missed
            let rx = self.subscribe();

            let current = self.store.load()?.settings();
            if current.has_credentials() {
                return Ok(current);
            }

            log::info!(
                "Settings watcher: waiting for host and API key (run `rmtracker configure`)"
            );

            let settings = rx.await.map_err(|_| {
                TrackerError::Configuration("settings watcher stopped".to_string())
            })?;
            if settings.has_credentials() {
                return Ok(settings);
            }
        }
    }
}

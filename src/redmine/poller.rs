//! Background "Awaiting answer" poller.
//!
//! The controller owns the last-known count and runs two timers: the
//! issue-count poll and the settings poll. Both are handled inside one
//! `select!` loop, so a cycle always finishes before the next tick is
//! looked at and no two requests are ever in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use super::client::IssueSource;
use crate::badge::{badge_text, BadgeSink};
use crate::error::TrackerError;
use crate::notification::Notifier;
use crate::state::ConfigStore;
use crate::types::{Config, Credentials};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Authenticating,
    Polling,
}

/// Longest accepted timer period
const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Timer periods, taken from the persisted config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub poll: Duration,
    pub settings: Duration,
    pub auth_retry: Duration,
}

impl Intervals {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll: Self::bounded(config.poll_interval_secs),
            settings: Self::bounded(config.settings_interval_secs),
            auth_retry: Self::bounded(config.auth_retry_secs),
        }
    }

    fn bounded(secs: u64) -> Duration {
        Duration::from_secs(secs.clamp(1, MAX_INTERVAL_SECS))
    }
}

/// What a successful poll changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub badge_text: String,
    /// Positive delta, only when the count went up
    pub new_issues: Option<u64>,
}

/// Compare a fresh count with the last-known one.
///
/// `None` means nothing to do. With `write_pending` set (first cycle after
/// startup, or a failed store write) an unchanged count still produces an
/// update so the badge and stored count get written.
pub fn reconcile(previous: u64, current: u64, write_pending: bool) -> Option<Reconciliation> {
    if current == previous && !write_pending {
        return None;
    }

    Some(Reconciliation {
        badge_text: badge_text(current),
        new_issues: (current > previous).then(|| current - previous),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Fetch failed; nothing touched
    Skipped,
    Unchanged,
    Updated { count: u64, new_issues: Option<u64> },
}

pub struct PollingController {
    source: Box<dyn IssueSource>,
    store: Arc<dyn ConfigStore>,
    badge: Arc<dyn BadgeSink>,
    notifier: Notifier,
    intervals: Intervals,
    credentials: Credentials,
    state: ControllerState,
    count: u64,
    /// Badge and stored count still need writing for `count`
    write_pending: bool,
}

impl PollingController {
    /// Build a controller around `source`, seeded from `config`.
    ///
    /// Fails when `config` has no host/API key.
    pub fn new(
        source: Box<dyn IssueSource>,
        config: &Config,
        store: Arc<dyn ConfigStore>,
        badge: Arc<dyn BadgeSink>,
        notifier: Notifier,
    ) -> Result<Self, TrackerError> {
        let credentials = config.credentials().ok_or_else(|| {
            TrackerError::Configuration("host and API key must be set".to_string())
        })?;

        Ok(Self {
            source,
            store,
            badge,
            notifier,
            intervals: Intervals::from_config(config),
            credentials,
            state: ControllerState::Uninitialized,
            count: config.count,
            write_pending: true,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Authenticate, retrying every `auth_retry` until it works.
    ///
    /// Returns false if shutdown was requested first.
    pub async fn authenticate_until_ready(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        self.state = ControllerState::Authenticating;

        loop {
            match self.source.authenticate().await {
                Ok(identity) => {
                    log::info!(
                        "Redmine poller: authenticated as {} ({}, id {})",
                        identity.name,
                        identity.login,
                        identity.id
                    );
                    self.state = ControllerState::Polling;
                    return true;
                }
                Err(e) => {
                    log::warn!(
                        "Redmine poller: authentication failed: {}; retrying in {}s",
                        e,
                        self.intervals.auth_retry.as_secs()
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.intervals.auth_retry) => {},
                _ = shutdown.changed() => return false,
            }

            // A fixed API key should be picked up before the next attempt
            self.settings_cycle();
        }
    }

    /// One fetch-compare-notify-persist cycle.
    pub async fn poll_cycle(&mut self) -> CycleOutcome {
        if self.source.identity().is_none() {
            if let Err(e) = self.source.authenticate().await {
                log::warn!("Redmine poller: re-authentication failed: {}", e);
                return CycleOutcome::Skipped;
            }
        }

        let current = match self.source.fetch_awaiting_count().await {
            Ok(count) => count,
            Err(e) => {
                log::warn!("Redmine poller: failed to fetch issues: {}", e);
                return CycleOutcome::Skipped;
            }
        };

        let Some(update) = reconcile(self.count, current, self.write_pending) else {
            log::debug!("Redmine poller: {} awaiting answer, unchanged", current);
            return CycleOutcome::Unchanged;
        };

        if let Err(e) = self.badge.set_text(&update.badge_text) {
            log::warn!("Redmine poller: failed to update badge: {}", e);
        }
        let mut persist = |config: &mut Config| config.count = current;
        self.write_pending = match self.store.update(&mut persist) {
            Ok(_) => false,
            Err(e) => {
                log::warn!(
                    "Redmine poller: failed to persist count, retrying next cycle: {}",
                    e
                );
                true
            }
        };

        log::info!(
            "Redmine poller: {} awaiting answer (was {})",
            current,
            self.count
        );
        self.count = current;

        if let Some(delta) = update.new_issues {
            self.notifier.notify_new_issues(delta).await;
        }

        CycleOutcome::Updated {
            count: current,
            new_issues: update.new_issues,
        }
    }

    /// Reconfigure the client if the stored host/key changed.
    ///
    /// Returns true when the client was reconfigured.
    pub fn settings_cycle(&mut self) -> bool {
        let config = match self.store.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Redmine poller: failed to read settings: {}", e);
                return false;
            }
        };

        let Some(credentials) = config.credentials() else {
            log::debug!("Redmine poller: host or API key cleared, keeping current client");
            return false;
        };

        if credentials == self.credentials {
            return false;
        }

        log::info!(
            "Redmine poller: settings changed, reconfiguring client for {}",
            credentials.host
        );
        self.source.configure(credentials.clone());
        self.credentials = credentials;
        true
    }

    /// Authenticate, then poll until `shutdown` flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if !self.authenticate_until_ready(&mut shutdown).await {
            return;
        }

        let mut poll = tokio::time::interval(self.intervals.poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let first_settings_tick = Instant::now() + self.intervals.settings;
        let mut settings = tokio::time::interval_at(first_settings_tick, self.intervals.settings);
        settings.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.poll_cycle().await;
                }
                _ = settings.tick() => {
                    self.settings_cycle();
                }
                _ = shutdown.changed() => {
                    log::info!("Redmine poller: stopping");
                    return;
                }
            }
        }
    }
}

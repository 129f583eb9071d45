pub mod badge;
pub mod error;
pub mod linkify;
pub mod notification;
pub mod options;
pub mod redmine;
pub mod settings;
pub mod state;
pub mod types;

use std::sync::Arc;

use tokio::sync::watch;

use badge::FileBadge;
use error::TrackerError;
use notification::{CommandBackend, Notifier};
use redmine::client::RedmineClient;
use redmine::poller::{Intervals, PollingController};
use settings::SettingsWatcher;
use state::{ConfigStore, FileConfigStore};

/// Run the tracker until Ctrl-C.
///
/// Waits for a host and API key to show up in the config, then hands over
/// to the poller.
pub async fn run_daemon() -> Result<(), TrackerError> {
    let store: Arc<dyn ConfigStore> = Arc::new(FileConfigStore::open_default()?);
    let intervals = Intervals::from_config(&store.load()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        log::info!("Shutting down");
        let _ = shutdown_tx.send(true);
    });

    // Startup gate
    let watcher = Arc::new(SettingsWatcher::new(store.clone()));
    let (gate_tx, gate_rx) = watch::channel(false);
    let watcher_task = tokio::spawn(watcher.clone().run(intervals.settings, gate_rx));

    let mut gate_shutdown = shutdown_rx.clone();
    let gated = tokio::select! {
        settings = watcher.wait_for_credentials() => Some(settings),
        _ = gate_shutdown.changed() => None,
    };
    let _ = gate_tx.send(true);
    let _ = watcher_task.await;

    let Some(settings) = gated.transpose()? else {
        return Ok(());
    };
    log::info!(
        "Settings watcher: configured for {}",
        settings.host.as_deref().unwrap_or_default()
    );

    let config = store.load()?;
    let credentials = config.credentials().ok_or_else(|| {
        TrackerError::Configuration("host and API key were removed during startup".to_string())
    })?;

    let controller = PollingController::new(
        Box::new(RedmineClient::new(credentials)?),
        &config,
        store.clone(),
        Arc::new(FileBadge::open_default()?),
        Notifier::new(Arc::new(CommandBackend::new(config.notifications))),
    )?;

    controller.run(shutdown_rx).await;
    Ok(())
}

//! End-to-end polling cycles against a mock Redmine: real client, file
//! config store and file badge, recording notification backend.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rmtracker_lib::badge::FileBadge;
use rmtracker_lib::error::TrackerError;
use rmtracker_lib::notification::{Notification, NotificationBackend, Notifier};
use rmtracker_lib::redmine::client::RedmineClient;
use rmtracker_lib::redmine::poller::{CycleOutcome, PollingController};
use rmtracker_lib::state::{ConfigStore, FileConfigStore};
use rmtracker_lib::types::{Config, PermissionState};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Recorder {
    bodies: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationBackend for Recorder {
    fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn request_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn show(&self, notification: &Notification) -> Result<(), TrackerError> {
        self.bodies.lock().push(notification.body.clone());
        Ok(())
    }
}

async fn mount_counts(server: &MockServer, counts: &[u64]) {
    Mock::given(method("GET"))
        .and(path("/users/current.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"id": 3, "login": "jdoe", "firstname": "Jane", "lastname": "Doe"}
        })))
        .mount(server)
        .await;

    let (last, scripted) = counts.split_last().unwrap();
    for count in scripted {
        Mock::given(method("GET"))
            .and(path("/issues.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_count": count})))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/issues.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_count": last})))
        .mount(server)
        .await;
}

fn read_badge(temp: &TempDir) -> String {
    let raw = std::fs::read_to_string(temp.path().join("badge.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    value["text"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_increase_then_steady_then_cleared() {
    let server = MockServer::start().await;
    mount_counts(&server, &[8, 8, 0]).await;

    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileConfigStore::new(temp.path().join("config.json")));
    store
        .save(&Config {
            host: Some(format!("{}/", server.uri())),
            api_key: Some("key".into()),
            count: 5,
            ..Config::default()
        })
        .unwrap();

    let config = store.load().unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut controller = PollingController::new(
        Box::new(RedmineClient::new(config.credentials().unwrap()).unwrap()),
        &config,
        store.clone(),
        Arc::new(FileBadge::new(temp.path().join("badge.json"))),
        Notifier::new(recorder.clone()),
    )
    .unwrap();

    assert_eq!(
        controller.poll_cycle().await,
        CycleOutcome::Updated {
            count: 8,
            new_issues: Some(3),
        }
    );
    assert_eq!(read_badge(&temp), "8");
    assert_eq!(store.load().unwrap().count, 8);
    assert_eq!(
        *recorder.bodies.lock(),
        vec!["3 new \"Awaiting answer\" issue(s)!"]
    );

    assert_eq!(controller.poll_cycle().await, CycleOutcome::Unchanged);
    assert_eq!(recorder.bodies.lock().len(), 1);

    assert_eq!(
        controller.poll_cycle().await,
        CycleOutcome::Updated {
            count: 0,
            new_issues: None,
        }
    );
    assert_eq!(read_badge(&temp), "");
    assert_eq!(store.load().unwrap().count, 0);
    assert_eq!(recorder.bodies.lock().len(), 1);
}

#[tokio::test]
async fn test_unreachable_host_skips_cycle() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileConfigStore::new(temp.path().join("config.json")));
    let config = Config {
        // Nothing listens on the discard port
        host: Some("http://127.0.0.1:9/".into()),
        api_key: Some("key".into()),
        count: 2,
        ..Config::default()
    };
    store.save(&config).unwrap();

    let mut controller = PollingController::new(
        Box::new(RedmineClient::new(config.credentials().unwrap()).unwrap()),
        &config,
        store.clone(),
        Arc::new(FileBadge::new(temp.path().join("badge.json"))),
        Notifier::new(Arc::new(Recorder::default())),
    )
    .unwrap();

    assert_eq!(controller.poll_cycle().await, CycleOutcome::Skipped);
    assert_eq!(store.load().unwrap().count, 2);
    assert!(!temp.path().join("badge.json").exists());
}

//! Desktop notifications
//!
//! [`Notifier`] walks the permission state machine; a
//! [`NotificationBackend`] does the actual showing. The default backend
//! shells out to the platform notifier (`notify-send` / `osascript`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::TrackerError;
use crate::types::PermissionState;

/// Title of every notification
pub const NOTIFICATION_TITLE: &str = "RM Tracker";

/// Replacement tag so a new notification replaces the previous one
pub const NOTIFICATION_TAG: &str = "rmtt-message";

/// Overrides the notifier command
pub const NOTIFY_BIN_ENV: &str = "RMTRACKER_NOTIFY_BIN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub tag: String,
    pub body: String,
}

impl Notification {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            title: NOTIFICATION_TITLE.to_string(),
            tag: NOTIFICATION_TAG.to_string(),
            body: body.into(),
        }
    }
}

/// What `notify` does for a given permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyStep {
    Show,
    Drop,
    RequestPermission,
}

impl PermissionState {
    pub fn next_step(self) -> NotifyStep {
        match self {
            PermissionState::Granted => NotifyStep::Show,
            PermissionState::Denied => NotifyStep::Drop,
            PermissionState::Prompt => NotifyStep::RequestPermission,
        }
    }
}

#[async_trait]
pub trait NotificationBackend: Send + Sync {
    fn permission(&self) -> PermissionState;

    /// Resolve an undetermined permission. Returns the new state.
    async fn request_permission(&self) -> PermissionState;

    async fn show(&self, notification: &Notification) -> Result<(), TrackerError>;
}

pub struct Notifier {
    backend: Arc<dyn NotificationBackend>,
}

impl Notifier {
    pub fn new(backend: Arc<dyn NotificationBackend>) -> Self {
        Self { backend }
    }

    /// Best-effort notification. Denial and backend failures are logged only.
    ///
    /// An undetermined permission is requested once, then `notify` is
    /// re-attempted with whatever the request resolved to.
    pub async fn notify(&self, message: &str) {
        let mut permission = self.backend.permission();
        let mut requested = false;

        loop {
            match permission.next_step() {
                NotifyStep::Drop => {
                    log::warn!("Notifier: permission denied, dropping \"{}\"", message);
                    return;
                }
                NotifyStep::Show => {
                    if let Err(e) = self.backend.show(&Notification::new(message)).await {
                        log::warn!("Notifier: {}", e);
                    }
                    return;
                }
                NotifyStep::RequestPermission if !requested => {
                    requested = true;
                    permission = self.backend.request_permission().await;
                    log::info!("Notifier: permission resolved to {:?}", permission);
                }
                NotifyStep::RequestPermission => {
                    log::warn!("Notifier: permission still undetermined, dropping \"{}\"", message);
                    return;
                }
            }
        }
    }

    pub async fn notify_new_issues(&self, delta: u64) {
        self.notify(&crate::redmine::new_issues_message(delta)).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    NotifySend,
    Osascript,
    /// Any other binary, called as `<bin> <title> <body>`
    Custom,
}

/// Notification backend that runs the platform notifier command.
pub struct CommandBackend {
    binary: String,
    kind: CommandKind,
    permission: Mutex<PermissionState>,
}

impl CommandBackend {
    /// Backend for `$RMTRACKER_NOTIFY_BIN` or the platform default.
    pub fn new(initial: PermissionState) -> Self {
        Self::with_binary(notifier_binary(), initial)
    }

    pub fn with_binary(binary: impl Into<String>, initial: PermissionState) -> Self {
        let binary = binary.into();
        let kind = match Path::new(&binary).file_name().and_then(|n| n.to_str()) {
            Some("notify-send") => CommandKind::NotifySend,
            Some("osascript") => CommandKind::Osascript,
            _ => CommandKind::Custom,
        };

        Self {
            binary,
            kind,
            permission: Mutex::new(initial),
        }
    }

    fn args(&self, notification: &Notification) -> Vec<String> {
        match self.kind {
            CommandKind::NotifySend => vec![
                "--app-name".to_string(),
                notification.title.clone(),
                "-h".to_string(),
                format!("string:x-canonical-private-synchronous:{}", notification.tag),
                notification.title.clone(),
                notification.body.clone(),
            ],
            CommandKind::Osascript => vec![
                "-e".to_string(),
                format!(
                    "display notification {} with title {}",
                    applescript_quote(&notification.body),
                    applescript_quote(&notification.title)
                ),
            ],
            CommandKind::Custom => vec![notification.title.clone(), notification.body.clone()],
        }
    }
}

#[async_trait]
impl NotificationBackend for CommandBackend {
    fn permission(&self) -> PermissionState {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> PermissionState {
        let resolved = if find_executable(&self.binary).is_some() {
            PermissionState::Granted
        } else {
            log::warn!("Notifier: {} not found, notifications disabled", self.binary);
            PermissionState::Denied
        };

        *self.permission.lock() = resolved;
        resolved
    }

    async fn show(&self, notification: &Notification) -> Result<(), TrackerError> {
        let output = tokio::process::Command::new(&self.binary)
            .args(self.args(notification))
            .output()
            .await
            .map_err(|e| {
                TrackerError::Notification(format!("failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TrackerError::Notification(format!(
                "{} exited with {}: {}",
                self.binary, output.status, stderr
            )));
        }

        Ok(())
    }
}

fn notifier_binary() -> String {
    std::env::var(NOTIFY_BIN_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| {
            if cfg!(target_os = "macos") {
                "osascript".to_string()
            } else {
                "notify-send".to_string()
            }
        })
}

/// Resolve `binary` the way the shell would: as a path if it has a
/// separator, otherwise through `$PATH`.
fn find_executable(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|full| full.is_file())
}

fn applescript_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend with scripted permission that records what it showed
    struct RecordingBackend {
        permission: Mutex<PermissionState>,
        on_request: PermissionState,
        requests: Mutex<usize>,
        shown: Mutex<Vec<Notification>>,
    }

    impl RecordingBackend {
        fn new(permission: PermissionState, on_request: PermissionState) -> Arc<Self> {
            Arc::new(Self {
                permission: Mutex::new(permission),
                on_request,
                requests: Mutex::new(0),
                shown: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NotificationBackend for RecordingBackend {
        fn permission(&self) -> PermissionState {
            *self.permission.lock()
        }

        async fn request_permission(&self) -> PermissionState {
            *self.requests.lock() += 1;
            *self.permission.lock() = self.on_request;
            self.on_request
        }

        async fn show(&self, notification: &Notification) -> Result<(), TrackerError> {
            self.shown.lock().push(notification.clone());
            Ok(())
        }
    }

    #[test]
    fn test_next_step() {
        assert_eq!(PermissionState::Granted.next_step(), NotifyStep::Show);
        assert_eq!(PermissionState::Denied.next_step(), NotifyStep::Drop);
        assert_eq!(
            PermissionState::Prompt.next_step(),
            NotifyStep::RequestPermission
        );
    }

    #[tokio::test]
    async fn test_granted_shows_immediately() {
        let backend = RecordingBackend::new(PermissionState::Granted, PermissionState::Denied);
        Notifier::new(backend.clone()).notify_new_issues(3).await;

        let shown = backend.shown.lock();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "RM Tracker");
        assert_eq!(shown[0].tag, "rmtt-message");
        assert_eq!(shown[0].body, "3 new \"Awaiting answer\" issue(s)!");
        assert_eq!(*backend.requests.lock(), 0);
    }

    #[tokio::test]
    async fn test_denied_is_silent() {
        let backend = RecordingBackend::new(PermissionState::Denied, PermissionState::Granted);
        Notifier::new(backend.clone()).notify("hello").await;

        assert!(backend.shown.lock().is_empty());
        assert_eq!(*backend.requests.lock(), 0);
    }

    #[tokio::test]
    async fn test_prompt_requests_then_shows() {
        let backend = RecordingBackend::new(PermissionState::Prompt, PermissionState::Granted);
        Notifier::new(backend.clone()).notify("hello").await;

        assert_eq!(*backend.requests.lock(), 1);
        assert_eq!(backend.shown.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_prompt_requests_only_once() {
        let backend = RecordingBackend::new(PermissionState::Prompt, PermissionState::Prompt);
        Notifier::new(backend.clone()).notify("hello").await;

        assert_eq!(*backend.requests.lock(), 1);
        assert!(backend.shown.lock().is_empty());
    }

    #[test]
    fn test_notify_send_args_carry_tag() {
        let backend = CommandBackend::with_binary("/usr/bin/notify-send", PermissionState::Granted);
        let args = backend.args(&Notification::new("2 new"));
        assert_eq!(
            args,
            vec![
                "--app-name",
                "RM Tracker",
                "-h",
                "string:x-canonical-private-synchronous:rmtt-message",
                "RM Tracker",
                "2 new",
            ]
        );
    }

    #[test]
    fn test_osascript_quotes_body() {
        let backend = CommandBackend::with_binary("osascript", PermissionState::Granted);
        let args = backend.args(&Notification::new("1 new \"Awaiting answer\" issue(s)!"));
        assert_eq!(args[0], "-e");
        assert_eq!(
            args[1],
            "display notification \"1 new \\\"Awaiting answer\\\" issue(s)!\" with title \"RM Tracker\""
        );
    }

    #[tokio::test]
    async fn test_request_permission_for_missing_binary_denies() {
        let backend =
            CommandBackend::with_binary("/nonexistent/rmtracker-notify", PermissionState::Prompt);
        assert_eq!(backend.request_permission().await, PermissionState::Denied);
        assert_eq!(backend.permission(), PermissionState::Denied);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_custom_binary_receives_title_and_body() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let log = temp.path().join("calls.log");
        let script = temp.path().join("fake-notifier");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nprintf '%s|%s\\n' \"$1\" \"$2\" >> '{}'\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend =
            CommandBackend::with_binary(script.to_string_lossy(), PermissionState::Prompt);
        Notifier::new(Arc::new(backend)).notify("5 new").await;

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.trim(), "RM Tracker|5 new");
    }
}

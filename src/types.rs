use serde::{Deserialize, Serialize};

/// Default issue-count poll interval
fn default_poll_interval_secs() -> u64 {
    10
}

/// Default settings-change poll interval
fn default_settings_interval_secs() -> u64 {
    30
}

/// Delay between failed authentication attempts
fn default_auth_retry_secs() -> u64 {
    10
}

/// Persisted configuration stored in ~/.rmtracker/config.json.
///
/// The first four keys (`host`, `apikey`, `count`, `issueFix`) keep the
/// names the options form has always written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, rename = "apikey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Last observed number of "Awaiting answer" issues
    #[serde(default)]
    pub count: u64,
    /// Enables the `#1234` link decorator
    #[serde(default)]
    pub issue_fix: bool,
    #[serde(default)]
    pub notifications: PermissionState,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_settings_interval_secs")]
    pub settings_interval_secs: u64,
    #[serde(default = "default_auth_retry_secs")]
    pub auth_retry_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            api_key: None,
            count: 0,
            issue_fix: false,
            notifications: PermissionState::default(),
            poll_interval_secs: default_poll_interval_secs(),
            settings_interval_secs: default_settings_interval_secs(),
            auth_retry_secs: default_auth_retry_secs(),
        }
    }
}

impl Config {
    /// User-editable view watched for changes
    pub fn settings(&self) -> Settings {
        Settings {
            host: self.host.clone(),
            api_key: self.api_key.clone(),
            issue_fix: self.issue_fix,
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.settings().credentials()
    }
}

/// The options-form subset of [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub host: Option<String>,
    #[serde(rename = "apikey")]
    pub api_key: Option<String>,
    pub issue_fix: bool,
}

impl Settings {
    /// Host and key, when both are present and non-empty
    pub fn credentials(&self) -> Option<Credentials> {
        let host = self.host.as_deref().filter(|h| !h.trim().is_empty())?;
        let api_key = self.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some(Credentials {
            host: host.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials().is_some()
    }
}

/// What the Redmine client needs to talk to a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Normalized base URL, e.g. `https://redmine.example.com/`
    pub host: String,
    pub api_key: String,
}

/// The authenticated Redmine account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub id: u64,
    pub login: String,
    /// `firstname lastname`
    pub name: String,
}

/// Desktop notification permission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; ask before the first notification
    #[default]
    Prompt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_reads_legacy_keys() {
        let json = r#"{"host":"https://rm.example.com/","apikey":"abc","count":5,"issueFix":true}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.host.as_deref(), Some("https://rm.example.com/"));
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.count, 5);
        assert!(config.issue_fix);
        assert_eq!(config.notifications, PermissionState::Prompt);
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.settings_interval_secs, 30);
    }

    #[test]
    fn test_config_writes_legacy_keys() {
        let config = Config {
            api_key: Some("abc".into()),
            issue_fix: true,
            ..Config::default()
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["apikey"], "abc");
        assert_eq!(value["issueFix"], true);
        assert!(value.get("host").is_none());
    }

    #[test]
    fn test_credentials_require_host_and_key() {
        let mut settings = Settings {
            host: Some("http://rm/".into()),
            api_key: Some("  ".into()),
            issue_fix: false,
        };
        assert!(!settings.has_credentials());

        settings.api_key = Some("key".into());
        assert_eq!(
            settings.credentials(),
            Some(Credentials {
                host: "http://rm/".into(),
                api_key: "key".into(),
            })
        );
    }

    #[test]
    fn test_permission_state_serde() {
        assert_eq!(
            serde_json::to_string(&PermissionState::Denied).unwrap(),
            "\"denied\""
        );
        let parsed: PermissionState = serde_json::from_str("\"granted\"").unwrap();
        assert_eq!(parsed, PermissionState::Granted);
    }
}

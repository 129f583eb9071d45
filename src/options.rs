//! Options form: host normalization and saving settings.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::TrackerError;
use crate::state::ConfigStore;
use crate::types::Config;

fn re_scheme() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^https?://").unwrap())
}

/// Ensure a scheme and a trailing slash.
///
/// Example: "example.com" → "http://example.com/". Blank input yields `None`.
pub fn normalize_host(host: &str) -> Option<String> {
    let host = host.trim();
    if host.is_empty() {
        return None;
    }

    let mut host = if re_scheme().is_match(host) {
        host.to_string()
    } else {
        format!("http://{}", host)
    };

    if !host.ends_with('/') {
        host.push('/');
    }

    Some(host)
}

/// Values submitted through the options surface.
///
/// `None` leaves a field as stored; an empty string clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsForm {
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub issue_fix: Option<bool>,
}

impl OptionsForm {
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.host.is_none() && self.issue_fix.is_none()
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(api_key) = &self.api_key {
            let api_key = api_key.trim();
            config.api_key = (!api_key.is_empty()).then(|| api_key.to_string());
        }
        if let Some(host) = &self.host {
            config.host = normalize_host(host);
        }
        if let Some(issue_fix) = self.issue_fix {
            config.issue_fix = issue_fix;
        }
    }
}

/// Apply `form` to the stored config, keeping the count and other keys.
pub fn save_options(store: &dyn ConfigStore, form: &OptionsForm) -> Result<Config, TrackerError> {
    let config = store.update(&mut |config: &mut Config| form.apply(config))?;
    log::info!(
        "Options: saved (host: {}, issueFix: {})",
        config.host.as_deref().unwrap_or("<unset>"),
        config.issue_fix
    );
    Ok(config)
}

/// Show only the last four characters of an API key.
pub fn mask_api_key(api_key: &str) -> String {
    let chars: Vec<char> = api_key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

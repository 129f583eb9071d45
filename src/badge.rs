//! Count badge
//!
//! The badge is a small JSON file (`badge.json`) that tray widgets and
//! status bars poll. Empty text means "no badge".

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::error::TrackerError;
use crate::state::write_json_atomic;

/// Badge background color (RGBA)
pub const BADGE_COLOR: [u8; 4] = [231, 76, 60, 255];

const BADGE_FILE: &str = "badge.json";

/// Text shown for a count: the number, or nothing at zero.
pub fn badge_text(count: u64) -> String {
    if count == 0 {
        String::new()
    } else {
        count.to_string()
    }
}

pub trait BadgeSink: Send + Sync {
    fn set_text(&self, text: &str) -> Result<(), TrackerError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BadgePayload<'a> {
    text: &'a str,
    color: [u8; 4],
    updated_at: String,
}

/// Writes the badge to `<state dir>/badge.json`.
#[derive(Debug, Clone)]
pub struct FileBadge {
    path: PathBuf,
}

impl FileBadge {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Result<Self, TrackerError> {
        Ok(Self::new(crate::state::state_dir()?.join(BADGE_FILE)))
    }
}

impl BadgeSink for FileBadge {
    fn set_text(&self, text: &str) -> Result<(), TrackerError> {
        let payload = BadgePayload {
            text,
            color: BADGE_COLOR,
            updated_at: Utc::now().to_rfc3339(),
        };
        write_json_atomic(&self.path, &serde_json::to_value(&payload)?)
    }
}

//! Persisted configuration
//!
//! The daemon, the settings watcher and the CLI all read and write the same
//! `config.json`. Access goes through [`ConfigStore`] so the polling logic
//! can be exercised against an in-memory store.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::TrackerError;
use crate::types::Config;

/// Environment variable overriding the state directory
pub const HOME_ENV: &str = "RMTRACKER_HOME";

const CONFIG_FILE: &str = "config.json";

/// Load/save access to the persisted [`Config`].
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Config, TrackerError>;

    fn save(&self, config: &Config) -> Result<(), TrackerError>;

    /// Read-modify-write. Returns the config as written.
    fn update(&self, mutator: &mut dyn FnMut(&mut Config)) -> Result<Config, TrackerError> {
        let mut config = self.load()?;
        mutator(&mut config);
        self.save(&config)?;
        Ok(config)
    }
}

/// Get the state directory (`$RMTRACKER_HOME` or `~/.rmtracker`)
pub fn state_dir() -> Result<PathBuf, TrackerError> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| TrackerError::Configuration("Could not find home directory".into()))?;
    Ok(home.join(".rmtracker"))
}

/// [`ConfigStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<state dir>/config.json`
    pub fn open_default() -> Result<Self, TrackerError> {
        Ok(Self::new(state_dir()?.join(CONFIG_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<Config, TrackerError> {
        if !self.path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            TrackerError::Io(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            TrackerError::Configuration(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, config: &Config) -> Result<(), TrackerError> {
        write_json_atomic(&self.path, &serde_json::to_value(config)?)
    }
}

/// Write JSON next to `path` and rename it into place.
pub(crate) fn write_json_atomic(
    path: &Path,
    value: &serde_json::Value,
) -> Result<(), TrackerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                TrackerError::Io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }

    let temp_path = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(value)?;
    fs::write(&temp_path, payload).map_err(|e| {
        TrackerError::Io(format!(
            "Failed to write temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;
    fs::rename(&temp_path, path)
        .map_err(|e| TrackerError::Io(format!("Failed to replace {}: {}", path.display(), e)))
}

/// In-memory [`ConfigStore`], used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<Config>,
    saves: Mutex<usize>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
            saves: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Config {
        self.config.lock().clone()
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Config, TrackerError> {
        Ok(self.config.lock().clone())
    }

    fn save(&self, config: &Config) -> Result<(), TrackerError> {
        *self.config.lock() = config.clone();
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_default() {
        let temp = TempDir::new().unwrap();
        let store = FileConfigStore::new(temp.path().join("config.json"));

        let config = store.load().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_creates_parent_and_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = FileConfigStore::new(temp.path().join("nested").join("config.json"));

        let config = Config {
            host: Some("https://rm.example.com/".into()),
            api_key: Some("secret".into()),
            count: 3,
            ..Config::default()
        };
        store.save(&config).unwrap();

        assert!(store.path().exists());
        assert!(!store.path().with_extension("json.tmp").exists());
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_corrupt_file_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileConfigStore::new(path).load().unwrap_err();
        assert!(matches!(err, TrackerError::Configuration(_)));
    }

    #[test]
    fn test_update_preserves_other_keys() {
        let store = MemoryConfigStore::new(Config {
            count: 7,
            issue_fix: true,
            ..Config::default()
        });

        let written = store
            .update(&mut |c: &mut Config| c.host = Some("http://rm/".into()))
            .unwrap();

        assert_eq!(written.count, 7);
        assert!(written.issue_fix);
        assert_eq!(store.snapshot().host.as_deref(), Some("http://rm/"));
        assert_eq!(store.save_count(), 1);
    }
}

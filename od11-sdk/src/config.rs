//! Config entries: what the user enters to add a device, and where it is kept

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use od11_api::defaults::{DEFAULT_WS_PATH, DOMAIN};
use od11_session::{SessionConfig, SessionError};

use crate::error::{Result, SdkError};

/// Data of one config entry
///
/// `host` is required; the rest fall back to the device defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host: String,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Defaults to `http://<host>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// e.g. `orthoplay=...` for devices that require it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

fn default_ws_path() -> String {
    DEFAULT_WS_PATH.to_string()
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().trim().to_string(),
            ws_path: default_ws_path(),
            origin: None,
            cookie: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// One entry per host: `od11_<host>`
    pub fn unique_id(&self) -> String {
        format!("{}_{}", DOMAIN, self.host)
    }

    pub fn title(&self) -> String {
        format!("OD-11 ({})", self.host)
    }

    /// Session settings for this entry; blank optional fields count as unset
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.host.trim());
        if !self.ws_path.trim().is_empty() {
            config = config.with_path(self.ws_path.trim());
        }
        if let Some(origin) = non_blank(&self.origin) {
            config = config.with_origin(origin);
        }
        if let Some(cookie) = non_blank(&self.cookie) {
            config = config.with_cookie(cookie);
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        self.session_config().validate().map_err(|e| match e {
            SessionError::Config(message) => SdkError::Config(message),
            other => SdkError::Session(other),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    version: u32,
    entries: Vec<DeviceConfig>,
}

const STORE_VERSION: u32 = 1;

/// Configured devices persisted as JSON
///
/// Defaults to `<config dir>/od11/entries.json`. Every change is written
/// through immediately.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    entries: Vec<DeviceConfig>,
}

impl ConfigStore {
    /// `<config dir>/od11/entries.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(DOMAIN).join("entries.json"))
    }

    pub fn open_default() -> Result<Self> {
        let path = Self::default_path()
            .ok_or_else(|| SdkError::Config("No config directory on this platform".to_string()))?;
        Self::open(path)
    }

    /// Load the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => {
                let file: StoreFile = serde_json::from_str(&text)?;
                if file.version > STORE_VERSION {
                    return Err(SdkError::Config(format!(
                        "{} was written by a newer version (format {})",
                        path.display(),
                        file.version
                    )));
                }
                file.entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), count = entries.len(), "Loaded config entries");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[DeviceConfig] {
        &self.entries
    }

    pub fn get(&self, unique_id: &str) -> Option<&DeviceConfig> {
        self.entries.iter().find(|e| e.unique_id() == unique_id)
    }

    /// Validate and store a new entry
    ///
    /// A host that is already configured is rejected with
    /// [`SdkError::DuplicateEntry`]. The store is unchanged if writing fails.
    pub fn add(&mut self, entry: DeviceConfig) -> Result<()> {
        entry.validate()?;
        let unique_id = entry.unique_id();
        if self.get(&unique_id).is_some() {
            return Err(SdkError::DuplicateEntry(unique_id));
        }
        let mut entries = self.entries.clone();
        entries.push(entry);
        self.commit(entries)?;
        tracing::info!(unique_id = %unique_id, "Added config entry");
        Ok(())
    }

    pub fn remove(&mut self, unique_id: &str) -> Result<Option<DeviceConfig>> {
        let Some(index) = self.entries.iter().position(|e| e.unique_id() == unique_id) else {
            return Ok(None);
        };
        let mut entries = self.entries.clone();
        let removed = entries.remove(index);
        self.commit(entries)?;
        tracing::info!(unique_id = %unique_id, "Removed config entry");
        Ok(Some(removed))
    }

    /// Write `entries` to disk, then adopt them
    fn commit(&mut self, entries: Vec<DeviceConfig>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = StoreFile {
            version: STORE_VERSION,
            entries,
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        self.entries = file.entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unique_id_and_title() {
        let config = DeviceConfig::new("10.13.12.212");
        assert_eq!(config.unique_id(), "od11_10.13.12.212");
        assert_eq!(config.title(), "OD-11 (10.13.12.212)");
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: DeviceConfig = serde_json::from_str(r#"{"host":"od11.local"}"#).unwrap();
        assert_eq!(config.ws_path, "/ws");
        assert!(config.origin.is_none());
        assert!(config.cookie.is_none());
    }

    #[test]
    fn test_session_config_mapping() {
        let config = DeviceConfig::new("10.0.0.5")
            .with_path("control")
            .with_origin("http://10.0.0.5/")
            .with_cookie("orthoplay=abc");
        let session = config.session_config();
        assert_eq!(session.url().unwrap().as_str(), "ws://10.0.0.5/control");
        assert_eq!(session.origin_header(), "http://10.0.0.5");
        assert_eq!(session.cookie.as_deref(), Some("orthoplay=abc"));
    }

    #[test]
    fn test_blank_optional_fields_are_unset() {
        let config = DeviceConfig::new("10.0.0.5").with_origin("  ").with_cookie("");
        let session = config.session_config();
        assert!(session.origin.is_none());
        assert!(session.cookie.is_none());
        assert_eq!(session.origin_header(), "http://10.0.0.5");
    }

    #[test]
    fn test_validate_rejects_ws_origin() {
        let config = DeviceConfig::new("10.0.0.5").with_origin("ws://10.0.0.5");
        assert!(matches!(config.validate(), Err(SdkError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        assert!(matches!(DeviceConfig::new("  ").validate(), Err(SdkError::Config(_))));
    }

    #[test]
    fn test_store_add_get_remove_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("od11").join("entries.json");
        let mut store = ConfigStore::open(&path).unwrap();
        assert!(store.entries().is_empty());

        store.add(DeviceConfig::new("10.0.0.5")).unwrap();
        store.add(DeviceConfig::new("10.0.0.6").with_cookie("c=1")).unwrap();

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.entries().len(), 2);
        assert_eq!(
            reopened.get("od11_10.0.0.6").and_then(|e| e.cookie.as_deref()),
            Some("c=1")
        );

        let mut store = reopened;
        let removed = store.remove("od11_10.0.0.5").unwrap();
        assert_eq!(removed.map(|e| e.host), Some("10.0.0.5".to_string()));
        assert!(store.remove("od11_10.0.0.5").unwrap().is_none());
        assert_eq!(ConfigStore::open(&path).unwrap().entries().len(), 1);
    }

    #[test]
    fn test_store_rejects_duplicate_host() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entries.json");
        let mut store = ConfigStore::open(&path).unwrap();
        store.add(DeviceConfig::new("10.0.0.5")).unwrap();

        let err = store
            .add(DeviceConfig::new("10.0.0.5").with_path("/other"))
            .unwrap_err();
        assert!(matches!(err, SdkError::DuplicateEntry(id) if id == "od11_10.0.0.5"));
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn test_store_rejects_invalid_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entries.json");
        let mut store = ConfigStore::open(&path).unwrap();
        let err = store
            .add(DeviceConfig::new("10.0.0.5").with_origin("wss://10.0.0.5"))
            .unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_store_rejects_newer_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entries.json");
        fs::write(&path, r#"{"version": 99, "entries": []}"#).unwrap();
        assert!(matches!(ConfigStore::open(&path), Err(SdkError::Config(_))));
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("entries.json");
        let mut store = ConfigStore::open(&path).unwrap();
        store.add(DeviceConfig::new("10.0.0.5")).unwrap();

        // Replace the store file with a directory so the rename fails
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), "").unwrap();

        assert!(store.add(DeviceConfig::new("10.0.0.6")).is_err());
        assert_eq!(store.entries().len(), 1);
        assert!(store.get("od11_10.0.0.6").is_none());

        assert!(store.remove("od11_10.0.0.5").is_err());
        assert!(store.get("od11_10.0.0.5").is_some());
    }

    #[test]
    fn test_unwritable_parent_leaves_store_unchanged() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        let mut store = ConfigStore::open(blocker.join("entries.json")).unwrap();
        fs::write(&blocker, "").unwrap();

        assert!(store.add(DeviceConfig::new("10.0.0.5")).is_err());
        assert!(store.entries().is_empty());

        fs::remove_file(&blocker).unwrap();
        store.add(DeviceConfig::new("10.0.0.5")).unwrap();
        assert_eq!(store.entries().len(), 1);
    }
}

//! Configuration persistence.
//!
//! [`ConfigStore`] is the only way the rest of the firmware reads or writes
//! settings. Every call moves the whole [`DeviceConfig`]; there is no lock
//! around a load-modify-save sequence. When the background portal thread and
//! the main loop both write, the later save wins and the other update is
//! silently lost. This is accepted: the main loop never writes while the
//! portal is running, and a save is always followed by a restart.

use super::device::{ConfigError, DeviceConfig};
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

/// Default file name for host builds.
pub const CONFIG_FILE: &str = "config.json";

/// Whole-object configuration storage.
pub trait ConfigStore {
    /// Load the stored configuration.
    ///
    /// Never fails: missing or unreadable storage yields the built-in
    /// defaults, and the reason is logged.
    fn load(&self) -> DeviceConfig;

    /// Replace the stored configuration.
    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError>;
}

impl<S: ConfigStore + ?Sized> ConfigStore for Arc<S> {
    fn load(&self) -> DeviceConfig {
        (**self).load()
    }

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        (**self).save(config)
    }
}

impl<S: ConfigStore + ?Sized> ConfigStore for &S {
    fn load(&self) -> DeviceConfig {
        (**self).load()
    }

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        (**self).save(config)
    }
}

/// JSON document in a file (host builds).
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store backed by the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> DeviceConfig {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => Zeroizing::new(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No configuration file at {:?}, using defaults", self.path);
                return DeviceConfig::default();
            }
            Err(e) => {
                warn!("Failed to read configuration file: {}", e);
                return DeviceConfig::default();
            }
        };

        match DeviceConfig::from_json(&text) {
            Ok(config) => {
                debug!("Configuration loaded from {:?}", self.path);
                config
            }
            Err(e) => {
                warn!("Stored configuration unusable ({}), using defaults", e);
                DeviceConfig::default()
            }
        }
    }

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = Zeroizing::new(config.to_json()?);
        fs::write(&self.path, json.as_bytes())?;

        // Read back to catch short writes.
        let read_back = Zeroizing::new(fs::read_to_string(&self.path)?);
        if read_back != json {
            return Err(ConfigError::Io(format!(
                "verification failed: wrote {} bytes, read {} bytes",
                json.len(),
                read_back.len()
            )));
        }

        info!("Configuration saved to {:?}", self.path);
        Ok(())
    }
}

/// Configuration held in memory only.
///
/// Used by tests and by the host portal when no file is wanted. The mutex
/// only guards the cell; it does not make load-modify-save atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: Mutex<DeviceConfig>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    /// Store holding `config`.
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config: Mutex::new(config),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> DeviceConfig {
        match self.config.lock() {
            Ok(config) => config.clone(),
            Err(poisoned) => {
                warn!("Memory store poisoned, using last value");
                poisoned.into_inner().clone()
            }
        }
    }

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        let mut slot = self
            .config
            .lock()
            .map_err(|_| ConfigError::Storage("memory store poisoned".into()))?;
        *slot = config.clone();
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test files even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_config_path() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir().join(format!("scorebox-test-{}-{}", pid, id)).join(CONFIG_FILE)
    }

    #[test]
    fn test_file_roundtrip() {
        let path = unique_config_path();
        let store = JsonFileStore::new(&path);

        let mut config = DeviceConfig::default();
        config.wifi.ssid = "Cabin".into();
        config.device.team_abbrev = "DAL".into();
        store.save(&config).expect("Failed to save");

        assert_eq!(store.load(), config);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let store = JsonFileStore::new(unique_config_path());
        assert_eq!(store.load(), DeviceConfig::default());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let path = unique_config_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{\"wifi\":").unwrap();

        let store = JsonFileStore::new(&path);
        assert_eq!(store.load(), DeviceConfig::default());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryStore::default();
        let mut config = store.load();
        config.device.brightness = 10;
        store.save(&config).unwrap();
        assert_eq!(store.load().device.brightness, 10);
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_interleaved_writers_lose_an_update() {
        // Two writers each load, change their own section, then save.
        // Whole-object replace means the first save is overwritten.
        let store = MemoryStore::default();

        let mut portal_view = store.load();
        let mut main_view = store.load();

        portal_view.wifi.ssid = "NewNetwork".into();
        main_view.device.brightness = 80;

        store.save(&portal_view).unwrap();
        store.save(&main_view).unwrap();

        let result = store.load();
        assert_eq!(result.device.brightness, 80);
        assert_eq!(result.wifi.ssid, "", "portal update lost");
    }

    #[test]
    fn test_arc_store_forwards() {
        let store = Arc::new(MemoryStore::default());
        let shared = store.clone();
        let mut config = shared.load();
        config.wifi.hostname = "rink".into();
        shared.save(&config).unwrap();
        assert_eq!(store.load().wifi.hostname, "rink");
    }
}

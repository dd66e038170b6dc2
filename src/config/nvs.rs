//! NVS persistence for the device configuration.
//!
//! The JSON document is stored as one raw blob in ESP32 Non-Volatile Storage
//! so it survives reboots and reflashing of the application partition.

use super::device::{ConfigError, DeviceConfig};
use super::store::ConfigStore;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::{debug, info, warn};
use std::sync::Mutex;
use zeroize::Zeroizing;

/// NVS namespace for ScoreBox configuration.
const NVS_NAMESPACE: &str = "scorebox";

/// NVS key for the configuration document.
const NVS_KEY: &str = "config";

/// Upper bound for the serialized document. The longest SSID, password and
/// hostname plus field names stay well under this.
const MAX_CONFIG_BUFFER_SIZE: usize = 512;

/// Configuration stored in NVS.
///
/// The mutex serialises driver access between the main loop and the portal
/// thread; it does not make load-modify-save atomic.
pub struct NvsStore {
    nvs: Mutex<EspNvs<NvsDefault>>,
}

impl NvsStore {
    /// Open (or create) the ScoreBox namespace.
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, ConfigError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)
            .map_err(|e| ConfigError::Storage(format!("{:?}", e)))?;
        Ok(Self {
            nvs: Mutex::new(nvs),
        })
    }
}

impl ConfigStore for NvsStore {
    fn load(&self) -> DeviceConfig {
        let nvs = match self.nvs.lock() {
            Ok(nvs) => nvs,
            Err(_) => {
                warn!("NVS handle poisoned, using defaults");
                return DeviceConfig::default();
            }
        };

        let mut buf = Zeroizing::new([0u8; MAX_CONFIG_BUFFER_SIZE]);
        let bytes = match nvs.get_raw(NVS_KEY, &mut buf[..]) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!("No configuration in NVS, using defaults");
                return DeviceConfig::default();
            }
            Err(e) => {
                warn!("Failed to read configuration from NVS: {:?}", e);
                return DeviceConfig::default();
            }
        };

        let text = match core::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("Stored configuration is not valid UTF-8: {:?}", e);
                return DeviceConfig::default();
            }
        };

        match DeviceConfig::from_json(text) {
            Ok(config) => {
                debug!("Configuration loaded from NVS");
                config
            }
            Err(e) => {
                warn!("Stored configuration unusable ({}), using defaults", e);
                DeviceConfig::default()
            }
        }
    }

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        let json = Zeroizing::new(config.to_json()?);
        if json.len() > MAX_CONFIG_BUFFER_SIZE {
            return Err(ConfigError::Storage(format!(
                "document too large: {} bytes (max {})",
                json.len(),
                MAX_CONFIG_BUFFER_SIZE
            )));
        }

        let mut nvs = self
            .nvs
            .lock()
            .map_err(|_| ConfigError::Storage("NVS handle poisoned".into()))?;

        nvs.set_raw(NVS_KEY, json.as_bytes())
            .map_err(|e| ConfigError::Storage(format!("{:?}", e)))?;

        // Read back to catch silent flash write failures
        let mut verify_buf = Zeroizing::new([0u8; MAX_CONFIG_BUFFER_SIZE]);
        let read_back = nvs
            .get_raw(NVS_KEY, &mut verify_buf[..])
            .map_err(|e| ConfigError::Storage(format!("read-back failed: {:?}", e)))?
            .ok_or_else(|| ConfigError::Storage("configuration missing after save".into()))?;

        if read_back != json.as_bytes() {
            return Err(ConfigError::Storage(
                "verification failed - data mismatch after save".into(),
            ));
        }

        info!("Configuration saved and verified in NVS");
        Ok(())
    }
}

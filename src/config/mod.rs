//! Device configuration.
//!
//! # Components
//!
//! - `device` - persisted settings and validation (host-testable)
//! - `store` - [`ConfigStore`] trait plus file and in-memory stores
//! - [`form`] - decoding of form bodies posted by the settings page
//! - `nvs` - NVS-backed store (ESP32 only)

pub mod form;

mod device;
mod store;

#[cfg(feature = "esp32")]
mod nvs;

pub use device::{
    ConfigError, DeviceConfig, DeviceSettings, WifiSettings, DEFAULT_BRIGHTNESS,
    DEFAULT_HOSTNAME, DEFAULT_POLL_INTERVAL, DEFAULT_TEAM, MAX_BRIGHTNESS, MAX_PASSWORD_LEN,
    MAX_SSID_LEN,
};
pub use form::FormData;
pub use store::{ConfigStore, JsonFileStore, MemoryStore, CONFIG_FILE};

#[cfg(feature = "esp32")]
pub use nvs::NvsStore;

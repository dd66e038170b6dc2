//! Device configuration data structures.
//!
//! Platform-independent types for the persisted settings, testable on the
//! host. The document is stored as nested JSON:
//!
//! ```json
//! {"wifi":{"ssid":"","password":"","hostname":"wildsensor"},
//!  "device":{"team_abbrev":"MIN","poll_interval":10,"brightness":50}}
//! ```
//!
//! # Example
//!
//! ```
//! use scorebox::config::DeviceConfig;
//!
//! let config = DeviceConfig::default();
//! assert_eq!(config.wifi.hostname, "wildsensor");
//! assert_eq!(config.device.team_abbrev, "MIN");
//!
//! let restored = DeviceConfig::from_json(&config.to_json().unwrap()).unwrap();
//! assert_eq!(config, restored);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Hostname used when none has been configured.
pub const DEFAULT_HOSTNAME: &str = "wildsensor";

/// Team followed when none has been configured.
pub const DEFAULT_TEAM: &str = "MIN";

/// Seconds between score feed polls.
pub const DEFAULT_POLL_INTERVAL: u32 = 10;

/// LED brightness, 0-100.
pub const DEFAULT_BRIGHTNESS: u32 = 50;

/// Upper bound of the brightness scale.
pub const MAX_BRIGHTNESS: u32 = 100;

/// Complete persisted configuration.
///
/// Always read and written as a whole. There is no per-field transaction, so
/// two writers doing load-modify-save at the same time lose one update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub wifi: WifiSettings,
    pub device: DeviceSettings,
}

/// Station credentials and the DHCP hostname. Every copy is wiped when
/// dropped.
// Per-field defaults (matching `WifiSettings::default()`): a struct-level
// `#[serde(default)]` would move fields out of a `Drop` type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct WifiSettings {
    #[serde(default)]
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}

/// Scoreboard behaviour settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Team abbreviation as it appears in the feed, upper case.
    pub team_abbrev: String,
    /// Seconds between feed polls.
    pub poll_interval: u32,
    /// LED brightness, 0-100.
    pub brightness: u32,
}

impl DeviceConfig {
    /// Serialize for storage.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Deserialize from storage. Missing sections and fields take defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl WifiSettings {
    /// Credentials for `ssid` with the given DHCP hostname.
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            hostname: hostname.into(),
        }
    }

    /// True when no network has been configured yet.
    pub fn is_unconfigured(&self) -> bool {
        self.ssid.is_empty()
    }

    /// Check lengths against what the radio accepts.
    ///
    /// An empty SSID is allowed here: saving it drops the device back into
    /// configuration mode on the next boot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::InvalidField {
                field: "ssid",
                reason: format!("{} bytes (max {})", self.ssid.len(), MAX_SSID_LEN),
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::InvalidField {
                field: "password",
                reason: format!(
                    "{} bytes (max {})",
                    self.password.len(),
                    MAX_PASSWORD_LEN
                ),
            });
        }
        Ok(())
    }
}

impl Default for WifiSettings {
    fn default() -> Self {
        Self::new("", "", DEFAULT_HOSTNAME)
    }
}

// Hand-written so the password never ends up in a log line.
impl fmt::Debug for WifiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiSettings")
            .field("ssid", &self.ssid)
            .field("password", &"****")
            .field("hostname", &self.hostname)
            .finish()
    }
}

impl DeviceSettings {
    /// Build settings from raw form text.
    ///
    /// The team is upper-cased; numbers must parse as unsigned integers and
    /// brightness must be within 0-100.
    pub fn parse(team: &str, poll: &str, brightness: &str) -> Result<Self, ConfigError> {
        let poll_interval = poll
            .trim()
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidField {
                field: "poll_interval",
                reason: format!("{:?}: {}", poll, e),
            })?;
        let brightness_value =
            brightness
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::InvalidField {
                    field: "brightness",
                    reason: format!("{:?}: {}", brightness, e),
                })?;
        if brightness_value > MAX_BRIGHTNESS {
            return Err(ConfigError::InvalidField {
                field: "brightness",
                reason: format!("{} (max {})", brightness_value, MAX_BRIGHTNESS),
            });
        }
        Ok(Self {
            team_abbrev: team.to_uppercase(),
            poll_interval,
            brightness: brightness_value,
        })
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            team_abbrev: DEFAULT_TEAM.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            brightness: DEFAULT_BRIGHTNESS,
        }
    }
}

/// Errors from loading, saving or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Reading or writing the backing storage failed.
    Io(String),
    /// Stored document is not valid configuration JSON.
    Parse(String),
    /// Persistent storage (NVS) rejected the operation.
    Storage(String),
    /// A submitted value could not be used.
    InvalidField { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "config I/O error: {}", msg),
            Self::Parse(msg) => write!(f, "invalid config document: {}", msg),
            Self::Storage(msg) => write!(f, "config storage error: {}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "invalid {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Defaults ====================

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.wifi.ssid, "");
        assert_eq!(config.wifi.password, "");
        assert_eq!(config.wifi.hostname, "wildsensor");
        assert_eq!(config.device.team_abbrev, "MIN");
        assert_eq!(config.device.poll_interval, 10);
        assert_eq!(config.device.brightness, 50);
        assert!(config.wifi.is_unconfigured());
    }

    // ==================== JSON ====================

    #[test]
    fn test_partial_document_fills_defaults() {
        let config = DeviceConfig::from_json(r#"{"wifi":{"ssid":"Cabin"}}"#).unwrap();
        assert_eq!(config.wifi.ssid, "Cabin");
        assert_eq!(config.wifi.hostname, "wildsensor");
        assert_eq!(config.device, DeviceSettings::default());
    }

    #[test]
    fn test_nested_layout() {
        let json = DeviceConfig::default().to_json().unwrap();
        assert!(json.contains(r#""wifi":{"#));
        assert!(json.contains(r#""team_abbrev":"MIN""#));
    }

    #[test]
    fn test_garbage_document() {
        let result = DeviceConfig::from_json("{not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    // ==================== Validation ====================

    #[test]
    fn test_ssid_too_long() {
        let wifi = WifiSettings::new("a".repeat(33), "password", "host");
        assert!(matches!(
            wifi.validate(),
            Err(ConfigError::InvalidField { field: "ssid", .. })
        ));
    }

    #[test]
    fn test_password_max_length() {
        let wifi = WifiSettings::new("net", "a".repeat(64), "host");
        assert!(wifi.validate().is_ok());
        let wifi = WifiSettings::new("net", "a".repeat(65), "host");
        assert!(wifi.validate().is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let wifi = WifiSettings::new("net", "hunter22", "host");
        let debug = format!("{:?}", wifi);
        assert!(!debug.contains("hunter22"));
        assert!(debug.contains("net"));
    }

    #[test]
    fn test_zeroize_clears_credentials() {
        let mut wifi = WifiSettings::new("net", "hunter22", "host");
        wifi.zeroize();
        assert!(wifi.ssid.is_empty());
        assert!(wifi.password.is_empty());
        assert!(wifi.hostname.is_empty());
    }

    #[test]
    fn test_device_settings_parse() {
        let settings = DeviceSettings::parse("col", "30", "75").unwrap();
        assert_eq!(settings.team_abbrev, "COL");
        assert_eq!(settings.poll_interval, 30);
        assert_eq!(settings.brightness, 75);
    }

    #[test]
    fn test_device_settings_rejects_bad_numbers() {
        assert!(matches!(
            DeviceSettings::parse("MIN", "soon", "50"),
            Err(ConfigError::InvalidField {
                field: "poll_interval",
                ..
            })
        ));
        assert!(matches!(
            DeviceSettings::parse("MIN", "10", "101"),
            Err(ConfigError::InvalidField {
                field: "brightness",
                ..
            })
        ));
    }
}

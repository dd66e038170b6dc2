//! ScoreBox firmware library.
//!
//! Everything except [`board`] and the ESP-IDF radio driver is
//! platform-independent and tested on the host through the traits in
//! [`hal`].

pub mod config;
pub mod hal;
pub mod portal;
pub mod power;
pub mod scanner;
pub mod wifi;

#[cfg(feature = "esp32")]
pub mod board;

// Re-export commonly used items
pub use config::{ConfigError, ConfigStore, DeviceConfig};
pub use hal::{HardwareError, RadioError, Rgb};
pub use portal::{ConfigServer, PortalMode, RestartRequest, ServeExit};
pub use power::{PowerManager, PowerState, PowerTransition};
pub use scanner::{poll_score, ScanOutcome, ScoreFeed, ScoreStreamScanner};
pub use wifi::{ConnectOutcome, ConnectivityContext, ConnectivityError, WifiConnectionManager};

//! WiFi connectivity.
//!
//! # Components
//!
//! - [`context`] - [`ConnectivityContext`], exclusive owner of both radio
//!   handles and the display
//! - [`manager`] - [`WifiConnectionManager`], the connect / AP-fallback state
//!   machine (host-testable)
//! - `connection` - ESP-IDF driver split into station and AP handles
//!   (ESP32 only)

pub mod context;
pub mod manager;

#[cfg(feature = "esp32")]
mod connection;

pub use crate::hal::RadioError;
pub use context::ConnectivityContext;
pub use manager::{
    ap_ssid, device_code, ConnectOutcome, ConnectivityError, ConnectivityState, FallbackPortal,
    WifiConnectionManager, AP_PASSWORD, AP_SSID_PREFIX, CONNECT_TIMEOUT_SECS, POLL_INTERVAL,
};

#[cfg(feature = "esp32")]
pub use connection::{split_radio, EspAccessPoint, EspStation};

//! Station connect with access-point fallback.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──associated──▶ Connected
//!                                  │
//!                                  └──no SSID / timeout──▶ ApFallback ──save──▶ restart
//! ```
//!
//! In `ApFallback` the configuration portal runs in the foreground and
//! [`WifiConnectionManager::connect`] only returns once the portal exits,
//! normally with a restart request after the user saved new settings.

use super::context::ConnectivityContext;
use super::RadioError;
use crate::config::WifiSettings;
use crate::hal::{AccessPointRadio, Display, Rgb, StationRadio};
use crate::portal::{RestartRequest, ServeExit};
use log::{debug, error, info, warn};
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

/// Seconds to wait for the station to associate.
pub const CONNECT_TIMEOUT_SECS: u32 = 15;

/// Status polls per second while associating.
pub const POLLS_PER_SECOND: u32 = 10;

/// Delay between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000 / POLLS_PER_SECOND as u64);

/// Prefix of the configuration network name.
pub const AP_SSID_PREFIX: &str = "scorebox";

/// Passphrase of the configuration network.
pub const AP_PASSWORD: &str = "configure";

/// Connection state, owned and mutated only by [`WifiConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
    /// Serving the configuration portal on our own access point.
    ApFallback,
}

/// How [`WifiConnectionManager::connect`] finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Station associated; address if the driver reported one.
    Connected(Option<Ipv4Addr>),
    /// The fallback portal saved settings. The caller restarts the device
    /// once it is done with anything in flight.
    RestartRequested(RestartRequest),
    /// The fallback portal was stopped without a save.
    PortalStopped,
}

/// Foreground configuration portal run on fallback.
pub trait FallbackPortal {
    /// Serve until settings are saved or the portal is stopped.
    fn serve_until_saved(&mut self) -> io::Result<ServeExit>;
}

/// Errors from connecting.
#[derive(Debug)]
pub enum ConnectivityError {
    /// No SSID configured.
    NoCredentials,
    /// The station did not associate within the allowed number of polls.
    Timeout { polls: u32 },
    /// A radio driver call failed.
    Radio(RadioError),
    /// The fallback portal could not be served.
    Portal(io::Error),
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::Timeout { polls } => write!(f, "not connected after {} polls", polls),
            Self::Radio(e) => write!(f, "radio error: {}", e),
            Self::Portal(e) => write!(f, "configuration portal failed: {}", e),
        }
    }
}

impl std::error::Error for ConnectivityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Radio(e) => Some(e),
            Self::Portal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RadioError> for ConnectivityError {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

/// Four upper-case hex digits identifying this unit: the last two bytes of
/// its hardware address.
pub fn device_code(mac: &[u8; 6]) -> String {
    format!("{:02X}{:02X}", mac[4], mac[5])
}

/// Name of the configuration network, e.g. `scorebox-EEFF`.
pub fn ap_ssid(prefix: &str, mac: &[u8; 6]) -> String {
    format!("{}-{}", prefix, device_code(mac))
}

/// Light a single pixel at `position` as a progress indicator.
fn show_spinner<D: Display>(display: &mut D, position: usize) {
    display.fill(Rgb::OFF);
    display.set_pixel(position, Rgb::dim_blue());
    if let Err(e) = display.write() {
        debug!("Spinner update failed: {}", e);
    }
}

/// Drives a [`ConnectivityContext`] through connect and fallback.
pub struct WifiConnectionManager {
    state: ConnectivityState,
    ip_addr: Option<Ipv4Addr>,
    poll_interval: Duration,
}

impl WifiConnectionManager {
    /// Manager polling every [`POLL_INTERVAL`].
    pub fn new() -> Self {
        Self::with_poll_interval(POLL_INTERVAL)
    }

    /// Manager with a custom delay between status polls.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            state: ConnectivityState::Disconnected,
            ip_addr: None,
            poll_interval,
        }
    }

    /// Where the last connect attempt left the radios.
    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// Address obtained by the last successful connect.
    pub fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.ip_addr
    }

    /// Associate as a station, polling up to `timeout_secs × 10` times.
    pub fn try_station<S, A, D>(
        &mut self,
        ctx: &mut ConnectivityContext<S, A, D>,
        wifi: &WifiSettings,
        timeout_secs: u32,
    ) -> Result<Option<Ipv4Addr>, ConnectivityError>
    where
        S: StationRadio,
        A: AccessPointRadio,
        D: Display,
    {
        if wifi.is_unconfigured() {
            info!("No SSID configured");
            self.state = ConnectivityState::Disconnected;
            return Err(ConnectivityError::NoCredentials);
        }

        ctx.enable_station_only()?;

        if let Err(e) = ctx.set_hostname(&wifi.hostname) {
            warn!("Could not set hostname '{}': {}", wifi.hostname, e);
        }

        if ctx.is_connected() {
            info!("Already connected to WiFi");
            return Ok(self.mark_connected(ctx, &wifi.hostname));
        }

        info!("Connecting to {} as '{}'...", wifi.ssid, wifi.hostname);
        self.state = ConnectivityState::Connecting;
        if let Err(e) = ctx.begin_connect(&wifi.ssid, &wifi.password) {
            self.state = ConnectivityState::Disconnected;
            return Err(e.into());
        }

        let max_polls = timeout_secs.saturating_mul(POLLS_PER_SECOND);
        let pixels = ctx.display().pixel_count();

        for poll in 0..max_polls {
            if ctx.is_connected() {
                return Ok(self.mark_connected(ctx, &wifi.hostname));
            }
            if pixels > 0 {
                show_spinner(ctx.display(), poll as usize % pixels);
            }
            thread::sleep(self.poll_interval);
        }

        warn!("Failed to connect to {} after {} polls", wifi.ssid, max_polls);
        if let Err(e) = ctx.station_off() {
            error!("Failed to deactivate station radio: {}", e);
        }
        self.state = ConnectivityState::Disconnected;
        Err(ConnectivityError::Timeout { polls: max_polls })
    }

    fn mark_connected<S, A, D>(
        &mut self,
        ctx: &mut ConnectivityContext<S, A, D>,
        hostname: &str,
    ) -> Option<Ipv4Addr>
    where
        S: StationRadio,
        A: AccessPointRadio,
        D: Display,
    {
        ctx.clear_display();
        self.ip_addr = ctx.station_ip();
        self.state = ConnectivityState::Connected;
        match self.ip_addr {
            Some(ip) => info!("WiFi connected, IP: {}, hostname: {}", ip, hostname),
            None => info!("WiFi connected, hostname: {}", hostname),
        }
        self.ip_addr
    }

    /// Bring up the configuration access point and show the AP colour.
    ///
    /// Returns the broadcast network name.
    pub fn start_fallback<S, A, D>(
        &mut self,
        ctx: &mut ConnectivityContext<S, A, D>,
    ) -> Result<String, ConnectivityError>
    where
        S: StationRadio,
        A: AccessPointRadio,
        D: Display,
    {
        let ssid = ap_ssid(AP_SSID_PREFIX, &ctx.mac_address());
        info!("Starting access point: {}", ssid);

        ctx.enable_access_point(&ssid, AP_PASSWORD)?;
        self.state = ConnectivityState::ApFallback;
        self.ip_addr = None;

        match ctx.access_point_ip() {
            Some(ip) => info!("AP started: {} (password: {}), visit http://{}", ssid, AP_PASSWORD, ip),
            None => info!("AP started: {} (password: {})", ssid, AP_PASSWORD),
        }

        ctx.display().fill(Rgb::dim_blue());
        if let Err(e) = ctx.display().write() {
            warn!("Could not show configuration mode colour: {}", e);
        }

        Ok(ssid)
    }

    /// Connect as a station, falling back to the configuration portal.
    ///
    /// Missing credentials and timeouts are not returned as errors: they
    /// start the access point and block in `portal` until it exits.
    pub fn connect<S, A, D, P>(
        &mut self,
        ctx: &mut ConnectivityContext<S, A, D>,
        wifi: &WifiSettings,
        timeout_secs: u32,
        portal: &mut P,
    ) -> Result<ConnectOutcome, ConnectivityError>
    where
        S: StationRadio,
        A: AccessPointRadio,
        D: Display,
        P: FallbackPortal,
    {
        match self.try_station(ctx, wifi, timeout_secs) {
            Ok(ip) => return Ok(ConnectOutcome::Connected(ip)),
            Err(e @ (ConnectivityError::NoCredentials | ConnectivityError::Timeout { .. })) => {
                warn!("Could not connect to WiFi ({}). Starting configuration mode...", e);
            }
            Err(e) => return Err(e),
        }

        self.start_fallback(ctx)?;

        match portal.serve_until_saved() {
            Ok(ServeExit::RestartRequested(request)) => {
                info!("Settings saved from configuration portal");
                Ok(ConnectOutcome::RestartRequested(request))
            }
            Ok(ServeExit::Stopped) => Ok(ConnectOutcome::PortalStopped),
            Err(e) => {
                error!("Configuration portal failed: {}", e);
                Err(ConnectivityError::Portal(e))
            }
        }
    }
}

impl Default for WifiConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

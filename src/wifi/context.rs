//! Exclusive ownership of the radio and display handles.

use crate::hal::{AccessPointRadio, Display, StationRadio};
use log::{debug, warn};
use std::net::Ipv4Addr;

use super::RadioError;

/// The station radio, access-point radio and LED display, owned together.
///
/// Station and access point are never both active, except inside
/// [`enable_access_point`](Self::enable_access_point) between the AP coming
/// up and the station going down. The radios themselves are not handed out:
/// activation only happens in the transition methods
/// ([`enable_station_only`](Self::enable_station_only),
/// [`wake_station`](Self::wake_station),
/// [`station_off`](Self::station_off),
/// [`enable_access_point`](Self::enable_access_point),
/// [`shutdown_radios`](Self::shutdown_radios)).
pub struct ConnectivityContext<S, A, D> {
    station: S,
    access_point: A,
    display: D,
}

impl<S, A, D> ConnectivityContext<S, A, D>
where
    S: StationRadio,
    A: AccessPointRadio,
    D: Display,
{
    /// Take ownership of both radios and the display.
    pub fn new(station: S, access_point: A, display: D) -> Self {
        Self {
            station,
            access_point,
            display,
        }
    }

    /// The LED display, for status colours.
    pub fn display(&mut self) -> &mut D {
        &mut self.display
    }

    /// DHCP hostname for the next association.
    pub fn set_hostname(&mut self, hostname: &str) -> Result<(), RadioError> {
        self.station.set_hostname(hostname)
    }

    /// Start associating. The station must already be on.
    pub fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        self.station.begin_connect(ssid, password)
    }

    /// Station associated and holding an address.
    pub fn is_connected(&mut self) -> bool {
        self.station.is_connected()
    }

    /// Address of the station interface, if it has one.
    pub fn station_ip(&self) -> Option<Ipv4Addr> {
        self.station.ip_addr()
    }

    /// Address of the access-point interface, if it has one.
    pub fn access_point_ip(&self) -> Option<Ipv4Addr> {
        self.access_point.ip_addr()
    }

    /// Factory MAC of the station radio.
    pub fn mac_address(&self) -> [u8; 6] {
        self.station.mac_address()
    }

    #[cfg(test)]
    pub(crate) fn station(&mut self) -> &mut S {
        &mut self.station
    }

    #[cfg(test)]
    pub(crate) fn access_point(&mut self) -> &mut A {
        &mut self.access_point
    }

    /// Station on, access point off.
    pub fn enable_station_only(&mut self) -> Result<(), RadioError> {
        if self.access_point.is_active() {
            debug!("Deactivating access point");
            self.access_point.set_active(false)?;
        }
        if !self.station.is_active() {
            debug!("Activating station radio");
            self.station.set_active(true)?;
        }
        Ok(())
    }

    /// Station back on after [`shutdown_radios`](Self::shutdown_radios).
    ///
    /// The access point stays off and nothing is associated; reconnecting
    /// is up to the caller.
    pub fn wake_station(&mut self) -> Result<(), RadioError> {
        debug!("Waking station radio");
        self.enable_station_only()
    }

    /// Station off after a failed association. The access point is left as
    /// it is.
    pub fn station_off(&mut self) -> Result<(), RadioError> {
        if self.station.is_active() {
            debug!("Deactivating station radio");
            self.station.set_active(false)?;
        }
        Ok(())
    }

    /// Broadcast `ssid` as an access point.
    ///
    /// The station is expected to be off already; if it is not, it is
    /// switched off once the access point is up.
    pub fn enable_access_point(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        self.access_point.configure(ssid, password)?;
        self.access_point.set_active(true)?;
        if self.station.is_active() {
            debug!("Deactivating station radio after AP start");
            self.station.set_active(false)?;
        }
        Ok(())
    }

    /// Both radios off, disconnecting the station first.
    ///
    /// Keeps going after a failing step so the other radio still powers
    /// down; the first failure is returned.
    pub fn shutdown_radios(&mut self) -> Result<(), RadioError> {
        let mut first_error = None;

        if self.station.is_connected() {
            debug!("Disconnecting station");
            if let Err(e) = self.station.disconnect() {
                warn!("Station disconnect failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.station.set_active(false) {
            warn!("Station deactivate failed: {}", e);
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.access_point.set_active(false) {
            warn!("Access point deactivate failed: {}", e);
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Turn every pixel off and commit.
    pub fn clear_display(&mut self) {
        self.display.fill(crate::hal::Rgb::OFF);
        if let Err(e) = self.display.write() {
            warn!("Display clear failed: {}", e);
        }
    }
}

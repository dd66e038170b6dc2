//! ESP-IDF WiFi driver as two radio handles.
//!
//! ESP-IDF has a single WiFi driver whose mode (client, access point or
//! mixed) follows from which interfaces are enabled. [`split_radio`] wraps it
//! into an [`EspStation`] and an [`EspAccessPoint`] sharing the driver; each
//! handle toggles its half and the driver configuration is recomputed.

use crate::hal::{AccessPointRadio, RadioError, StationRadio};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
use esp_idf_sys::EspError;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

fn driver_error(e: EspError) -> RadioError {
    RadioError::Driver(format!("{:?}", e))
}

/// Driver plus the desired state of each interface.
struct SharedRadio {
    wifi: EspWifi<'static>,
    client: ClientConfiguration,
    access_point: AccessPointConfiguration,
    station_on: bool,
    ap_on: bool,
    mac: [u8; 6],
}

impl SharedRadio {
    /// Push the combined interface state into the driver.
    fn apply(&mut self) -> Result<(), RadioError> {
        let config = match (self.station_on, self.ap_on) {
            (false, false) => {
                if self.wifi.is_started().unwrap_or(false) {
                    debug!("Stopping WiFi driver");
                    self.wifi.stop().map_err(driver_error)?;
                }
                return Ok(());
            }
            (true, false) => Configuration::Client(self.client.clone()),
            (false, true) => Configuration::AccessPoint(self.access_point.clone()),
            (true, true) => {
                Configuration::Mixed(self.client.clone(), self.access_point.clone())
            }
        };

        self.wifi.set_configuration(&config).map_err(driver_error)?;
        if !self.wifi.is_started().map_err(driver_error)? {
            debug!("Starting WiFi driver");
            self.wifi.start().map_err(driver_error)?;
        }
        Ok(())
    }
}

/// Station half of the ESP32 radio.
pub struct EspStation {
    radio: Rc<RefCell<SharedRadio>>,
}

/// Access-point half of the ESP32 radio.
pub struct EspAccessPoint {
    radio: Rc<RefCell<SharedRadio>>,
}

/// Create the WiFi driver and split it into station and AP handles.
pub fn split_radio(
    modem: Modem,
    sysloop: EspSystemEventLoop,
    nvs: Option<EspDefaultNvsPartition>,
) -> Result<(EspStation, EspAccessPoint), RadioError> {
    let wifi = EspWifi::new(modem, sysloop, nvs).map_err(driver_error)?;

    let mac = match wifi.sta_netif().get_mac() {
        Ok(mac) => mac,
        Err(e) => {
            warn!("Could not read station MAC: {:?}", e);
            [0; 6]
        }
    };

    let radio = Rc::new(RefCell::new(SharedRadio {
        wifi,
        client: ClientConfiguration::default(),
        access_point: AccessPointConfiguration::default(),
        station_on: false,
        ap_on: false,
        mac,
    }));

    Ok((
        EspStation {
            radio: radio.clone(),
        },
        EspAccessPoint { radio },
    ))
}

impl StationRadio for EspStation {
    fn set_active(&mut self, active: bool) -> Result<(), RadioError> {
        let mut radio = self.radio.borrow_mut();
        if radio.station_on == active {
            return Ok(());
        }
        radio.station_on = active;
        radio.apply()
    }

    fn is_active(&self) -> bool {
        self.radio.borrow().station_on
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<(), RadioError> {
        self.radio
            .borrow_mut()
            .wifi
            .sta_netif_mut()
            .set_hostname(hostname)
            .map_err(driver_error)
    }

    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        let mut radio = self.radio.borrow_mut();
        if !radio.station_on {
            return Err(RadioError::Driver("station radio is off".into()));
        }

        radio.client = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| RadioError::InvalidArgument(format!("SSID {:?}", ssid)))?,
            password: password
                .try_into()
                .map_err(|_| RadioError::InvalidArgument("password too long".into()))?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };
        radio.apply()?;

        // Non-blocking on the raw driver; progress is observed via is_connected.
        radio.wifi.connect().map_err(driver_error)
    }

    fn is_connected(&mut self) -> bool {
        let radio = self.radio.borrow();
        radio.wifi.is_connected().unwrap_or(false) && radio.wifi.sta_netif().is_up().unwrap_or(false)
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        info!("Disconnecting from WiFi");
        self.radio
            .borrow_mut()
            .wifi
            .disconnect()
            .map_err(driver_error)
    }

    fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.radio
            .borrow()
            .wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
    }

    fn mac_address(&self) -> [u8; 6] {
        self.radio.borrow().mac
    }
}

impl AccessPointRadio for EspAccessPoint {
    fn set_active(&mut self, active: bool) -> Result<(), RadioError> {
        let mut radio = self.radio.borrow_mut();
        if radio.ap_on == active {
            return Ok(());
        }
        radio.ap_on = active;
        radio.apply()
    }

    fn is_active(&self) -> bool {
        self.radio.borrow().ap_on
    }

    fn configure(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        let mut radio = self.radio.borrow_mut();
        radio.access_point = AccessPointConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| RadioError::InvalidArgument(format!("AP SSID {:?}", ssid)))?,
            password: password
                .try_into()
                .map_err(|_| RadioError::InvalidArgument("AP password too long".into()))?,
            auth_method: AuthMethod::WPA2Personal,
            channel: 1,
            ..Default::default()
        };
        if radio.ap_on {
            radio.apply()?;
        }
        Ok(())
    }

    fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.radio
            .borrow()
            .wifi
            .ap_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
    }
}

//! Test doubles for the hardware traits.

use super::{AccessPointRadio, DigitalInput, Display, HardwareError, RadioError, Rgb, StationRadio};
use std::net::Ipv4Addr;

/// Frame buffer that remembers what was committed.
pub struct MockDisplay {
    pub pixels: Vec<Rgb>,
    pub writes: usize,
    /// Pixel that was lit (non-off) in each committed frame, if exactly one.
    pub lit_history: Vec<Option<usize>>,
    pub fail_writes: bool,
}

impl MockDisplay {
    pub fn new(count: usize) -> Self {
        Self {
            pixels: vec![Rgb::OFF; count],
            writes: 0,
            lit_history: Vec::new(),
            fail_writes: false,
        }
    }

    pub fn all(&self, color: Rgb) -> bool {
        self.pixels.iter().all(|p| *p == color)
    }
}

impl Display for MockDisplay {
    fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    fn fill(&mut self, color: Rgb) {
        self.pixels.iter_mut().for_each(|p| *p = color);
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(p) = self.pixels.get_mut(index) {
            *p = color;
        }
    }

    fn write(&mut self) -> Result<(), HardwareError> {
        if self.fail_writes {
            return Err(HardwareError::Driver("strip not responding".into()));
        }
        self.writes += 1;
        let lit: Vec<usize> = self
            .pixels
            .iter()
            .enumerate()
            .filter(|(_, p)| **p != Rgb::OFF)
            .map(|(i, _)| i)
            .collect();
        self.lit_history
            .push(if lit.len() == 1 { Some(lit[0]) } else { None });
        Ok(())
    }
}

/// Button whose level is set directly by the test.
pub struct MockButton {
    pub pressed: bool,
}

impl MockButton {
    pub fn released() -> Self {
        Self { pressed: false }
    }
}

impl DigitalInput for MockButton {
    fn is_high(&mut self) -> bool {
        // Pull-up: released reads high.
        !self.pressed
    }
}

/// Station radio that associates after a scripted number of polls.
pub struct MockStation {
    pub active: bool,
    pub connected: bool,
    /// Polls of `is_connected` before association succeeds; `None` never.
    pub connect_after: Option<u32>,
    pub polls: u32,
    pub hostname: Option<String>,
    pub fail_hostname: bool,
    pub connect_requests: Vec<(String, String)>,
    pub disconnects: u32,
    pub mac: [u8; 6],
}

impl MockStation {
    pub fn new() -> Self {
        Self {
            active: false,
            connected: false,
            connect_after: None,
            polls: 0,
            hostname: None,
            fail_hostname: false,
            connect_requests: Vec::new(),
            disconnects: 0,
            mac: [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
        }
    }

    pub fn connecting_after(polls: u32) -> Self {
        Self {
            connect_after: Some(polls),
            ..Self::new()
        }
    }
}

impl StationRadio for MockStation {
    fn set_active(&mut self, active: bool) -> Result<(), RadioError> {
        self.active = active;
        if !active {
            self.connected = false;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<(), RadioError> {
        if self.fail_hostname {
            return Err(RadioError::Driver("netif busy".into()));
        }
        self.hostname = Some(hostname.to_string());
        Ok(())
    }

    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        self.connect_requests
            .push((ssid.to_string(), password.to_string()));
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        if self.connected {
            return true;
        }
        if !self.connect_requests.is_empty() {
            self.polls += 1;
            if let Some(after) = self.connect_after {
                if self.polls > after {
                    self.connected = true;
                }
            }
        }
        self.connected
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        self.disconnects += 1;
        self.connected = false;
        Ok(())
    }

    fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.connected.then(|| Ipv4Addr::new(192, 168, 1, 42))
    }

    fn mac_address(&self) -> [u8; 6] {
        self.mac
    }
}

/// Access point that records its configuration.
#[derive(Default)]
pub struct MockAccessPoint {
    pub active: bool,
    pub ssid: Option<String>,
    pub password: Option<String>,
}

impl AccessPointRadio for MockAccessPoint {
    fn set_active(&mut self, active: bool) -> Result<(), RadioError> {
        self.active = active;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn configure(&mut self, ssid: &str, password: &str) -> Result<(), RadioError> {
        self.ssid = Some(ssid.to_string());
        self.password = Some(password.to_string());
        Ok(())
    }

    fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.active.then(|| Ipv4Addr::new(192, 168, 4, 1))
    }
}

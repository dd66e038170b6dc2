//! Hardware seams.
//!
//! The core components only talk to hardware through these traits, so the
//! connect state machine, the power manager and the portal can be exercised
//! on the host with the doubles in `mock` (test builds only). ESP32 drivers
//! live in [`crate::board`] and [`crate::wifi`] behind the `esp32` feature.

use std::fmt;
use std::net::Ipv4Addr;

#[cfg(test)]
pub(crate) mod mock;

/// Brightness used for status indication, 5% of full scale.
pub const STATUS_BRIGHTNESS: u8 = 13;

/// A single RGB pixel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// All channels off.
    pub const OFF: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Low-brightness blue shown while connecting and in configuration mode.
    pub const fn dim_blue() -> Self {
        Self::new(0, 0, STATUS_BRIGHTNESS)
    }
}

/// Addressable LED strip.
///
/// Drawing calls only touch the frame buffer; nothing reaches the LEDs until
/// [`Display::write`] commits it.
pub trait Display {
    /// Number of pixels on the strip.
    fn pixel_count(&self) -> usize;

    /// Set every pixel to `color`.
    fn fill(&mut self, color: Rgb);

    /// Set one pixel. Indices past the end of the strip are ignored.
    fn set_pixel(&mut self, index: usize, color: Rgb);

    /// Push the frame buffer out to the LEDs.
    fn write(&mut self) -> Result<(), HardwareError>;
}

/// A strip that failed to initialise: nothing to draw on, every write
/// succeeds.
impl<D: Display> Display for Option<D> {
    fn pixel_count(&self) -> usize {
        self.as_ref().map_or(0, |d| d.pixel_count())
    }

    fn fill(&mut self, color: Rgb) {
        if let Some(d) = self {
            d.fill(color);
        }
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(d) = self {
            d.set_pixel(index, color);
        }
    }

    fn write(&mut self) -> Result<(), HardwareError> {
        match self {
            Some(d) => d.write(),
            None => Ok(()),
        }
    }
}

/// A digital input pin.
pub trait DigitalInput {
    /// Current logic level.
    fn is_high(&mut self) -> bool;

    fn is_low(&mut self) -> bool {
        !self.is_high()
    }
}

/// A missing button reads as released.
impl<B: DigitalInput> DigitalInput for Option<B> {
    fn is_high(&mut self) -> bool {
        self.as_mut().map_or(true, |b| b.is_high())
    }
}

/// The station (client) side of the WiFi radio.
pub trait StationRadio {
    fn set_active(&mut self, active: bool) -> Result<(), RadioError>;

    fn is_active(&self) -> bool;

    /// Set the DHCP hostname announced when associating.
    fn set_hostname(&mut self, hostname: &str) -> Result<(), RadioError>;

    /// Start associating with a network. Does not wait for the result.
    fn begin_connect(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    /// True once associated and holding an address.
    fn is_connected(&mut self) -> bool;

    fn disconnect(&mut self) -> Result<(), RadioError>;

    fn ip_addr(&self) -> Option<Ipv4Addr>;

    /// Factory hardware address of the radio.
    fn mac_address(&self) -> [u8; 6];
}

/// The access-point (host) side of the WiFi radio.
pub trait AccessPointRadio {
    fn set_active(&mut self, active: bool) -> Result<(), RadioError>;

    fn is_active(&self) -> bool;

    /// Set the broadcast network name and WPA2 passphrase.
    fn configure(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    fn ip_addr(&self) -> Option<Ipv4Addr>;
}

/// Errors reported by radio drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// Value rejected by the driver (too long, bad characters).
    InvalidArgument(String),
    /// The driver call itself failed.
    Driver(String),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::Driver(msg) => write!(f, "radio driver error: {}", msg),
        }
    }
}

impl std::error::Error for RadioError {}

/// Peripheral failures. None of these stop the firmware; the feature that
/// needed the peripheral is disabled and the failure logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// The peripheral is not fitted or did not initialise.
    Absent(&'static str),
    /// A driver call failed.
    Driver(String),
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent(what) => write!(f, "{} not available", what),
            Self::Driver(msg) => write!(f, "hardware error: {}", msg),
        }
    }
}

impl std::error::Error for HardwareError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_blue_is_five_percent() {
        assert_eq!(Rgb::dim_blue(), Rgb::new(0, 0, 13));
        assert_eq!(STATUS_BRIGHTNESS as u32, (255 * 5 + 50) / 100);
    }

    #[test]
    fn test_is_low_inverts_level() {
        struct Fixed(bool);
        impl DigitalInput for Fixed {
            fn is_high(&mut self) -> bool {
                self.0
            }
        }
        assert!(Fixed(false).is_low());
        assert!(!Fixed(true).is_low());
        assert!(!None::<Fixed>.is_low());
    }

    #[test]
    fn test_absent_display_accepts_writes() {
        let mut display: Option<mock::MockDisplay> = None;
        assert_eq!(display.pixel_count(), 0);
        display.fill(Rgb::dim_blue());
        assert_eq!(display.write(), Ok(()));
    }
}

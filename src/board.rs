//! ESP32 board peripherals: LED strip, power button, LED power relay, score
//! feed over HTTPS and the restart primitive.

use crate::hal::{DigitalInput, Display, HardwareError, Rgb};
use crate::scanner::ScoreFeed;
use embedded_svc::http::client::Connection;
use embedded_svc::http::{Method, Status};
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Input, Output, PinDriver, Pull};
use esp_idf_hal::rmt::config::TransmitConfig;
use esp_idf_hal::rmt::{PinState, Pulse, RmtChannel, TxRmtDriver, VariableLengthSignal};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use log::{info, warn};
use std::io;
use std::time::Duration;

/// LED strip data line.
pub const DATA_PIN: u8 = 16;

/// Relay switching power to the LED strip.
pub const RELAY_PIN: u8 = 12;

/// Boot button, reused as the power button.
pub const POWER_BUTTON_PIN: u8 = 0;

/// Pixels on the strip.
pub const NUM_LEDS: usize = 96;

/// Live scores for every game today.
pub const SCORE_FEED_URL: &str = "https://api-web.nhle.com/v1/score/now";

const FEED_TIMEOUT: Duration = Duration::from_secs(10);

fn hw_error(e: impl std::fmt::Debug) -> HardwareError {
    HardwareError::Driver(format!("{:?}", e))
}

/// WS2812 strip driven through the RMT peripheral.
pub struct Ws2812 {
    tx: TxRmtDriver<'static>,
    pixels: Vec<Rgb>,
    /// Scale applied on write, percent.
    brightness: u8,
}

impl Ws2812 {
    /// Strip of `count` pixels on `pin`, all off.
    pub fn new<C: RmtChannel>(
        channel: impl Peripheral<P = C> + 'static,
        pin: AnyOutputPin,
        count: usize,
    ) -> Result<Self, HardwareError> {
        if count == 0 {
            return Err(HardwareError::Absent("LED strip"));
        }
        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, pin, &config).map_err(hw_error)?;
        Ok(Self {
            tx,
            pixels: vec![Rgb::OFF; count],
            brightness: 100,
        })
    }

    /// Scale every committed colour to `percent` of its value.
    pub fn set_brightness(&mut self, percent: u32) {
        self.brightness = percent.min(100) as u8;
    }

    fn scale(&self, value: u8) -> u8 {
        (u16::from(value) * u16::from(self.brightness) / 100) as u8
    }
}

impl Display for Ws2812 {
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
        let ticks_hz = self.tx.counter_clock().map_err(hw_error)?;
        let t0h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(350))
            .map_err(hw_error)?;
        let t0l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(800))
            .map_err(hw_error)?;
        let t1h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(700))
            .map_err(hw_error)?;
        let t1l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(600))
            .map_err(hw_error)?;

        let mut signal = VariableLengthSignal::with_capacity(self.pixels.len() * 24 * 2);
        for pixel in &self.pixels {
            // Wire order is GRB, most significant bit first.
            let grb = (u32::from(self.scale(pixel.g)) << 16)
                | (u32::from(self.scale(pixel.r)) << 8)
                | u32::from(self.scale(pixel.b));
            for bit in (0..24).rev() {
                let pulses = if grb & (1 << bit) != 0 {
                    [&t1h, &t1l]
                } else {
                    [&t0h, &t0l]
                };
                signal.push(pulses).map_err(hw_error)?;
            }
        }

        self.tx.start_blocking(&signal).map_err(hw_error)
    }
}

/// Active-low push button with the internal pull-up enabled.
pub struct EspButton {
    pin: PinDriver<'static, AnyIOPin, Input>,
}

impl EspButton {
    /// Button on `pin`.
    pub fn new(pin: AnyIOPin) -> Result<Self, HardwareError> {
        let mut pin = PinDriver::input(pin).map_err(hw_error)?;
        pin.set_pull(Pull::Up).map_err(hw_error)?;
        Ok(Self { pin })
    }
}

impl DigitalInput for EspButton {
    fn is_high(&mut self) -> bool {
        self.pin.is_high()
    }
}

/// Switch the LED strip supply on. The returned driver must be kept alive.
pub fn power_on_strip(pin: AnyOutputPin) -> Result<PinDriver<'static, AnyOutputPin, Output>, HardwareError> {
    let mut relay = PinDriver::output(pin).map_err(hw_error)?;
    relay.set_high().map_err(hw_error)?;
    info!("LED strip power on (GPIO {})", RELAY_PIN);
    Ok(relay)
}

fn feed_error(e: impl std::fmt::Debug) -> io::Error {
    io::Error::other(format!("{:?}", e))
}

/// Score feed fetched over HTTPS with the built-in certificate bundle.
pub struct HttpsFeed {
    url: String,
}

impl HttpsFeed {
    /// Feed at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for HttpsFeed {
    fn default() -> Self {
        Self::new(SCORE_FEED_URL)
    }
}

impl ScoreFeed for HttpsFeed {
    type Reader = HttpsStream;

    fn open(&mut self) -> io::Result<HttpsStream> {
        let config = HttpConfiguration {
            timeout: Some(FEED_TIMEOUT),
            crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let mut conn = EspHttpConnection::new(&config).map_err(feed_error)?;
        conn.initiate_request(Method::Get, &self.url, &[])
            .map_err(feed_error)?;
        conn.initiate_response().map_err(feed_error)?;

        let status = conn.status();
        if !(200..300).contains(&status) {
            return Err(io::Error::other(format!("score feed returned HTTP {}", status)));
        }
        Ok(HttpsStream { conn })
    }
}

/// Response body of an open feed request. Dropping it closes the
/// connection.
pub struct HttpsStream {
    conn: EspHttpConnection,
}

impl io::Read for HttpsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        embedded_svc::io::Read::read(&mut self.conn, buf).map_err(feed_error)
    }
}

/// Restart the chip. Does not return.
pub fn restart() -> ! {
    warn!("Restarting...");
    unsafe { esp_idf_sys::esp_restart() }
}

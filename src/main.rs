//! ScoreBox firmware binary.
//!
//! Boot sequence:
//! 1. Load settings from NVS
//! 2. Connect to WiFi, or serve the setup portal on our own access point
//!    until settings are saved, then restart
//! 3. Serve the settings portal in the background
//! 4. Tick every 100 ms: power button first, then reconnect / restart /
//!    score polling
//!
//! Flash with `cargo espflash flash --bin scorebox --features esp32 --release`.

#[cfg(feature = "esp32")]
mod firmware {
    use esp_idf_hal::gpio::IOPin;
    use esp_idf_hal::gpio::OutputPin;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use log::{error, info, warn};
    use scorebox::board::{self, EspButton, HttpsFeed, Ws2812, NUM_LEDS};
    use scorebox::config::{ConfigStore, NvsStore};
    use scorebox::hal::{AccessPointRadio, Display, StationRadio};
    use scorebox::portal::{
        BackgroundPortal, ConfigServer, EmbeddedTemplates, PortalMode, RestartRequest,
    };
    use scorebox::wifi::{
        device_code, split_radio, ConnectOutcome, ConnectivityContext, WifiConnectionManager,
        CONNECT_TIMEOUT_SECS,
    };
    use scorebox::{poll_score, PowerManager, ScanOutcome, ScoreStreamScanner};
    use std::error::Error;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Main loop period.
    const TICK: Duration = Duration::from_millis(100);

    /// Delay before restarting after an unrecoverable startup failure.
    const FAILURE_RESTART_DELAY: Duration = Duration::from_secs(10);

    fn restart_after(request: RestartRequest) -> ! {
        info!("Restarting in {:?}", request.delay);
        thread::sleep(request.delay);
        board::restart()
    }

    /// Connect as a station; on failure block in the setup portal and
    /// restart once it saved. Returns only when connected.
    fn connect_or_setup<S, A, D>(
        manager: &mut WifiConnectionManager,
        ctx: &mut ConnectivityContext<S, A, D>,
        store: &Arc<NvsStore>,
        code: &str,
    ) where
        S: StationRadio,
        A: AccessPointRadio,
        D: Display,
    {
        let wifi = store.load().wifi;
        let mut setup = ConfigServer::new(
            store.clone(),
            EmbeddedTemplates,
            PortalMode::Setup,
            code,
        );

        match manager.connect(ctx, &wifi, CONNECT_TIMEOUT_SECS, &mut setup) {
            Ok(ConnectOutcome::Connected(_)) => {}
            Ok(ConnectOutcome::RestartRequested(request)) => restart_after(request),
            Ok(ConnectOutcome::PortalStopped) => {
                warn!("Setup portal stopped without saving");
                restart_after(RestartRequest::default())
            }
            Err(e) => {
                error!("WiFi setup failed: {}", e);
                restart_after(RestartRequest {
                    delay: FAILURE_RESTART_DELAY,
                })
            }
        }
    }

    fn start_settings_portal(store: &Arc<NvsStore>, code: &str) -> Option<BackgroundPortal> {
        let server = ConfigServer::new(
            store.clone(),
            EmbeddedTemplates,
            PortalMode::Settings,
            code,
        );
        match server.start_background() {
            Ok(portal) => Some(portal),
            Err(e) => {
                warn!("Settings portal unavailable: {}", e);
                None
            }
        }
    }

    /// Bring up the board and run the main loop. Returns only on a startup error.
    pub fn run() -> Result<(), Box<dyn Error>> {
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs_partition = EspDefaultNvsPartition::take()?;

        let store = Arc::new(NvsStore::new(nvs_partition.clone())?);
        let config = store.load();
        info!(
            "Team {}, polling every {}s, brightness {}%",
            config.device.team_abbrev, config.device.poll_interval, config.device.brightness
        );

        // Kept alive for the lifetime of the firmware.
        let _relay = match board::power_on_strip(peripherals.pins.gpio12.downgrade_output()) {
            Ok(relay) => Some(relay),
            Err(e) => {
                warn!("LED power relay unavailable: {}", e);
                None
            }
        };

        let display = match Ws2812::new(
            peripherals.rmt.channel0,
            peripherals.pins.gpio16.downgrade_output(),
            NUM_LEDS,
        ) {
            Ok(mut strip) => {
                strip.set_brightness(config.device.brightness);
                Some(strip)
            }
            Err(e) => {
                warn!("LED strip disabled: {}", e);
                None
            }
        };

        let button = match EspButton::new(peripherals.pins.gpio0.downgrade()) {
            Ok(button) => Some(button),
            Err(e) => {
                warn!("Power button disabled: {}", e);
                None
            }
        };

        let (station, access_point) = split_radio(peripherals.modem, sysloop, Some(nvs_partition))?;
        let code = device_code(&station.mac_address());
        info!("Device code {}", code);

        let mut ctx = ConnectivityContext::new(station, access_point, display);
        let mut manager = WifiConnectionManager::new();
        connect_or_setup(&mut manager, &mut ctx, &store, &code);

        let mut portal = start_settings_portal(&store, &code);
        let mut power = PowerManager::new(button);
        let scanner = ScoreStreamScanner::new(&config.device.team_abbrev);
        let mut feed = HttpsFeed::default();
        let poll_every = Duration::from_secs(u64::from(config.device.poll_interval.max(1)));
        let mut last_poll: Option<Instant> = None;
        let mut last_score: Option<ScanOutcome> = None;

        info!("Entering main loop...");
        loop {
            let transition = power.update(&mut ctx);
            if power.is_asleep() {
                thread::sleep(TICK);
                continue;
            }

            if transition.needs_reconnect() {
                // The setup portal may need port 80.
                drop(portal.take());
                connect_or_setup(&mut manager, &mut ctx, &store, &code);
                portal = start_settings_portal(&store, &code);
                last_poll = None;
            }

            if let Some(request) = portal.as_ref().and_then(|p| p.restart_requested()) {
                info!("Settings changed from the web portal");
                restart_after(request);
            }

            if last_poll.map_or(true, |t| t.elapsed() >= poll_every) {
                last_poll = Some(Instant::now());
                let outcome = poll_score(&mut feed, &scanner);
                match outcome {
                    ScanOutcome::Score(score) => {
                        if last_score != Some(outcome) {
                            info!("{} score: {}", config.device.team_abbrev, score);
                        }
                    }
                    ScanOutcome::NotFound => {
                        info!("{} not playing today", config.device.team_abbrev)
                    }
                    ScanOutcome::NetworkError => warn!("Score check failed"),
                }
                last_score = Some(outcome);
            }

            thread::sleep(TICK);
        }
    }

    /// Log a startup error and restart after a delay.
    pub fn restart_on_failure(e: Box<dyn Error>) -> ! {
        error!("Startup failed: {}", e);
        restart_after(RestartRequest {
            delay: FAILURE_RESTART_DELAY,
        })
    }
}

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("=== ScoreBox starting ===");

    if let Err(e) = firmware::run() {
        firmware::restart_on_failure(e);
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-portal' to try the settings portal on the host.");
}

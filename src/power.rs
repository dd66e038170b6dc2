//! Sleep/wake toggle on the power button.
//!
//! The button pulls the input low when pressed. A press is acted on only if
//! at least the debounce interval has passed since the last accepted press;
//! the very first press is always accepted. The input is level-triggered:
//! holding the button down toggles again every time the debounce interval
//! elapses.

use crate::hal::{AccessPointRadio, DigitalInput, Display, StationRadio};
use crate::wifi::ConnectivityContext;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Minimum time between two accepted presses.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Awake,
    Asleep,
}

/// What a call to [`PowerManager::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTransition {
    NoChange,
    /// Display cleared and both radios off.
    WentToSleep,
    /// Station radio back on; the caller should connect again.
    WokeUp,
}

impl PowerTransition {
    /// True after waking: the station is on but not associated.
    pub fn needs_reconnect(self) -> bool {
        self == Self::WokeUp
    }
}

/// Owns the power state and the button that toggles it.
pub struct PowerManager<B> {
    button: B,
    state: PowerState,
    debounce: Duration,
    last_press: Option<Instant>,
}

impl<B: DigitalInput> PowerManager<B> {
    /// Awake, debouncing presses by [`DEBOUNCE`].
    pub fn new(button: B) -> Self {
        Self::with_debounce(button, DEBOUNCE)
    }

    /// Awake, ignoring presses closer together than `debounce`.
    pub fn with_debounce(button: B, debounce: Duration) -> Self {
        Self {
            button,
            state: PowerState::Awake,
            debounce,
            last_press: None,
        }
    }

    /// Current power state.
    pub fn state(&self) -> PowerState {
        self.state
    }

    /// True while the display and radios are off.
    pub fn is_asleep(&self) -> bool {
        self.state == PowerState::Asleep
    }

    /// Check the button once and toggle on an accepted press.
    pub fn update<S, A, D>(&mut self, ctx: &mut ConnectivityContext<S, A, D>) -> PowerTransition
    where
        S: StationRadio,
        A: AccessPointRadio,
        D: Display,
    {
        self.update_at(ctx, Instant::now())
    }

    /// [`update`](Self::update) with an explicit clock reading.
    pub fn update_at<S, A, D>(
        &mut self,
        ctx: &mut ConnectivityContext<S, A, D>,
        now: Instant,
    ) -> PowerTransition
    where
        S: StationRadio,
        A: AccessPointRadio,
        D: Display,
    {
        if !self.button.is_low() {
            return PowerTransition::NoChange;
        }

        if let Some(last) = self.last_press {
            if now.saturating_duration_since(last) < self.debounce {
                return PowerTransition::NoChange;
            }
        }
        self.last_press = Some(now);
        debug!("Power button press accepted");

        match self.state {
            PowerState::Awake => {
                self.sleep(ctx);
                PowerTransition::WentToSleep
            }
            PowerState::Asleep => {
                self.wake(ctx);
                PowerTransition::WokeUp
            }
        }
    }

    fn sleep<S, A, D>(&mut self, ctx: &mut ConnectivityContext<S, A, D>)
    where
        S: StationRadio,
        A: AccessPointRadio,
        D: Display,
    {
        info!("Going to sleep...");
        ctx.clear_display();
        if let Err(e) = ctx.shutdown_radios() {
            warn!("Radio shutdown incomplete: {}", e);
        }
        self.state = PowerState::Asleep;
    }

    fn wake<S, A, D>(&mut self, ctx: &mut ConnectivityContext<S, A, D>)
    where
        S: StationRadio,
        A: AccessPointRadio,
        D: Display,
    {
        info!("Waking up...");
        if let Err(e) = ctx.wake_station() {
            warn!("Could not reactivate station radio: {}", e);
        }
        self.state = PowerState::Awake;
    }
}

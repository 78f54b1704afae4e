//! The kiosk flow on top of the keypad and display runtime.

use log::{debug, info, warn};
use time::Duration;
use kiosk_hmi::queue::{DisplayMessage, SlotState};
use kiosk_hmi::{Hmi, LineInput, LineMode};
use kiosk_io::IoResult;
use crate::config::Config;

/// Display id of the idle banner.
const BANNER_ID: u8 = 1;
/// Display id of the access result and its countdown.
const RESULT_ID: u8 = 2;
/// Display id of the service menu banner.
const SERVICE_ID: u8 = 3;

const BACKGROUND_PRIORITY: u8 = 200;
const RESULT_PRIORITY: u8 = 5;

/// Line typed in the service menu to leave it.
const SERVICE_EXIT: &str = "exit";

/// The main app state struct.
pub struct App<'a> {
    /// The configuration for the app.
    config: Config,
    /// The current state of the app.
    state: AppState,
    /// Keypad and display.
    hmi: Hmi<'a>,
    /// Time of the previous [App::update], in milliseconds of the HMI clock.
    last_update_ms: u64,
}

impl<'a> App<'a> {
    pub fn new(config: Config, hmi: Hmi<'a>) -> App<'a> {
        let last_update_ms = hmi.now_ms();
        App {
            config,
            state: AppState::default(),
            hmi,
            last_update_ms,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn hmi(&self) -> &Hmi<'a> {
        &self.hmi
    }

    /// Runs one step of the kiosk flow.
    ///
    /// Steps that read input block until the input is complete or times out.
    pub fn update(&mut self) -> IoResult<()> {
        let now = self.hmi.now_ms();
        let elapsed = Duration::milliseconds(now.saturating_sub(self.last_update_ms) as i64);

        let next = match &mut self.state {
            AppState::Idle => {
                if self.hmi.queue().state_of(BANNER_ID) == SlotState::Empty {
                    self.hmi.request(
                        DisplayMessage::lines("Welcome", "Press any key")
                            .with_id(BANNER_ID)
                            .with_priority(BACKGROUND_PRIORITY)
                            .with_min_dwell_ms(0),
                    )?;
                }
                if self.hmi.is_any_key_active()? {
                    debug!("Key activity, starting PIN entry.");
                    Some(AppState::EnteringPin)
                } else {
                    None
                }
            }
            AppState::EnteringPin => {
                self.hmi.complete(BANNER_ID);
                let input = self.hmi.read_line(LineMode::Pin, self.config.idle_timeout_ms)?;
                Some(match input {
                    LineInput::Line(pin) if pin == self.config.pin => {
                        info!("Access granted.");
                        AppState::Granted {
                            remaining: Duration::seconds(self.config.access_seconds as i64),
                        }
                    }
                    LineInput::Line(_) => {
                        warn!("Incorrect PIN entered.");
                        AppState::Denied
                    }
                    LineInput::IdleTimeout => {
                        info!("PIN entry abandoned.");
                        AppState::Idle
                    }
                    LineInput::ServiceEscape => {
                        info!("Entering service mode.");
                        AppState::Service
                    }
                })
            }
            AppState::Granted { remaining } => {
                let prev_sec = remaining.whole_seconds();
                *remaining -= elapsed;
                let now_sec = remaining.whole_seconds();

                if remaining.is_negative() {
                    info!("Access window closed.");
                    self.hmi.complete(RESULT_ID);
                    Some(AppState::Idle)
                } else {
                    if prev_sec != now_sec || elapsed.is_zero() {
                        self.hmi.request(
                            DisplayMessage::lines("Access granted", format!("{}s remaining", now_sec.max(0) + 1))
                                .with_id(RESULT_ID)
                                .with_priority(RESULT_PRIORITY)
                                .with_min_dwell_ms(0),
                        )?;
                    }
                    None
                }
            }
            AppState::Denied => {
                self.hmi.request(
                    DisplayMessage::text("Access denied")
                        .with_id(RESULT_ID)
                        .with_priority(RESULT_PRIORITY)
                        .with_min_dwell_ms(2000),
                )?;
                Some(AppState::Idle)
            }
            AppState::Service => {
                self.hmi.request(
                    DisplayMessage::lines("Service", "Type exit to leave")
                        .with_id(SERVICE_ID)
                        .with_priority(BACKGROUND_PRIORITY)
                        .with_min_dwell_ms(0),
                )?;
                match self.hmi.read_line(LineMode::Plain, self.config.idle_timeout_ms)? {
                    LineInput::Line(command) if command == SERVICE_EXIT => {
                        info!("Leaving service mode.");
                        Some(AppState::Idle)
                    }
                    LineInput::Line(command) => {
                        info!("Service command {:?}", command);
                        None
                    }
                    LineInput::IdleTimeout => {
                        info!("Service mode timed out.");
                        Some(AppState::Idle)
                    }
                    LineInput::ServiceEscape => None,
                }
            }
        };

        if let Some(next) = next {
            if next != AppState::Service {
                self.hmi.complete(SERVICE_ID);
            }
            debug!("{:?} -> {:?}", self.state, next);
            self.state = next;
        }

        self.last_update_ms = self.hmi.now_ms();
        self.hmi.refresh()
    }
}

/// Enum that can represent the different states of the application.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum AppState {
    /// Waiting for someone to touch the keypad.
    #[default]
    Idle,
    /// Reading a PIN.
    EnteringPin,
    /// The correct PIN was entered.
    Granted {
        /// The remaining time until access is revoked.
        remaining: Duration,
    },
    /// A wrong PIN was entered.
    Denied,
    /// The service menu, reached by holding `#` during PIN entry.
    Service,
}

use serde::{Deserialize, Serialize};
use kiosk_io::keypad::{KeypadWiring, ScanTiming, COLS, ROWS};
use kiosk_io::Pin;
use crate::queue::QueueTiming;

/// Tunables of the keypad and display runtime. All times are in milliseconds.
///
/// Missing fields fall back to their defaults, so a config file only needs to list what it
/// changes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmiConfig {
    pub short_press_ms: u64,
    pub long_press_ms: u64,
    pub auto_return_ms: u64,
    pub fast_return_ms: u64,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    /// ADC reading (out of 4095) above which a keypad column is active.
    pub analog_threshold: u16,
    pub multi_tap_window_ms: u64,
    pub stale_after_ms: u64,
    pub max_extra_on_overwrite_ms: u64,
    pub password_reveal_ms: u64,
    /// How long the "abc"/"ABC" confirmation stays up after a case toggle.
    pub case_toggle_dwell_ms: u64,
    /// Maximum number of keys in one line of input.
    pub max_line_len: usize,
    /// Priority of the line being typed and its confirmations.
    pub line_priority: u8,
    pub row_pins: [Pin; ROWS],
    pub col_pins: [Pin; COLS],
}

impl Default for HmiConfig {
    fn default() -> Self {
        let timing = ScanTiming::default();
        let wiring = KeypadWiring::default();
        let queue = QueueTiming::default();
        HmiConfig {
            short_press_ms: timing.short_press_ms,
            long_press_ms: timing.long_press_ms,
            auto_return_ms: timing.auto_return_ms,
            fast_return_ms: timing.fast_return_ms,
            poll_interval_ms: timing.poll_interval_ms,
            debounce_ms: timing.debounce_ms,
            analog_threshold: wiring.analog_threshold,
            multi_tap_window_ms: 400,
            stale_after_ms: queue.stale_after_ms,
            max_extra_on_overwrite_ms: queue.max_extra_on_overwrite_ms,
            password_reveal_ms: queue.password_reveal_ms,
            case_toggle_dwell_ms: 600,
            max_line_len: crate::codec::MAX_LINE_KEYS,
            line_priority: 10,
            row_pins: wiring.rows,
            col_pins: wiring.cols,
        }
    }
}

impl HmiConfig {
    pub fn scan_timing(&self) -> ScanTiming {
        ScanTiming {
            short_press_ms: self.short_press_ms,
            long_press_ms: self.long_press_ms,
            auto_return_ms: self.auto_return_ms,
            fast_return_ms: self.fast_return_ms,
            poll_interval_ms: self.poll_interval_ms,
            debounce_ms: self.debounce_ms,
        }
    }

    pub fn wiring(&self) -> KeypadWiring {
        KeypadWiring {
            rows: self.row_pins,
            cols: self.col_pins,
            analog_threshold: self.analog_threshold,
        }
    }

    pub fn queue_timing(&self) -> QueueTiming {
        QueueTiming {
            stale_after_ms: self.stale_after_ms,
            max_extra_on_overwrite_ms: self.max_extra_on_overwrite_ms,
            password_reveal_ms: self.password_reveal_ms,
        }
    }
}

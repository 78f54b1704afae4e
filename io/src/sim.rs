//! In-memory bench hardware: a virtual clock, the keypad behind the shift register and the
//! analog multiplexer, and a display that records what it was asked to draw.

use std::cell::Cell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use bitvec::prelude::*;
use log::{info, trace};
use thiserror::Error;
use crate::display::DisplayDriver;
use crate::keypad::{Key, KeypadWiring, ROWS};
use crate::{Clock, IoError, IoResult, Pin, VirtualIo};

/// Full-scale reading of the 12-bit ADC.
pub const ADC_MAX: u16 = 4095;

/// Level above which a multiplexed input reads as digital high.
pub const DIGITAL_HIGH_THRESHOLD: u16 = 1000;

/// Hold time of a short tap in a script.
pub const SCRIPT_TAP_MS: u64 = 80;
/// Hold time of a normal press in a script.
pub const SCRIPT_NORMAL_MS: u64 = 300;
/// Hold time of a long press in a script.
pub const SCRIPT_LONG_MS: u64 = 1200;
/// Gap between two scripted presses.
pub const SCRIPT_GAP_MS: u64 = 120;

/// A [Clock] whose time only moves when someone sleeps or advances it.
///
/// Clones share the same time, so the keypad and the code scanning it stay in sync.
#[derive(Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Debug for SimClock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimClock({} ms)", self.now.get())
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: u64) {
        // A zero-length sleep must still make progress or polling loops never end.
        self.advance(ms.max(1));
    }
}

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum ScriptError {
    #[error("unknown key in token {0:?}")]
    UnknownKey(String),
    #[error("invalid pause in token {0:?}")]
    InvalidPause(String),
    #[error("script runs past the end of the clock at token {0:?}")]
    TooLong(String),
}

#[derive(Copy, Clone, Debug)]
struct ScheduledPress {
    key: Key,
    pressed_at: u64,
    released_at: u64,
}

/// The board's I/O as seen through the pin namespace: MCU pins 0-10, multiplexer inputs
/// 100-107 and shift register outputs 200-207, with a keypad matrix between the rows and
/// columns given by the wiring.
pub struct SimKeypad {
    clock: SimClock,
    wiring: KeypadWiring,
    shift_register: BitArr!(for 8, in u8, Msb0),
    mcu_pins: BitArr!(for 11, in u16),
    presses: Vec<ScheduledPress>,
    cut_rows: [bool; ROWS],
    column_leak: [u16; 3],
}

impl SimKeypad {
    const MCU_PINS: std::ops::RangeInclusive<Pin> = 0..=10;
    const MUX_PINS: std::ops::RangeInclusive<Pin> = 100..=107;
    const SHIFT_PINS: std::ops::RangeInclusive<Pin> = 200..=207;
    const RESERVED_MCU_PINS: [Pin; 9] = [0, 1, 3, 4, 5, 6, 7, 8, 9];

    pub fn new(clock: SimClock, wiring: KeypadWiring) -> Self {
        SimKeypad {
            clock,
            wiring,
            shift_register: BitArray::ZERO,
            mcu_pins: BitArray::ZERO,
            presses: Vec::new(),
            cut_rows: [false; ROWS],
            column_leak: [0; 3],
        }
    }

    /// Holds `key` down from `pressed_at` until `released_at`.
    pub fn press(&mut self, key: Key, pressed_at: u64, released_at: u64) {
        self.presses.push(ScheduledPress {
            key,
            pressed_at,
            released_at,
        });
    }

    /// Schedules a script of presses starting at `start` and returns when the last one ends.
    ///
    /// Tokens are whitespace separated: `K` taps, `K-` presses, `K_` holds key `K`
    /// (`0`-`9`, `*` or `#`); `~N` pauses for `N` ms. Nothing is scheduled if the script is
    /// invalid.
    pub fn schedule(&mut self, script: &str, start: u64) -> Result<u64, ScriptError> {
        let mut at = start;
        let mut presses = Vec::new();
        for token in script.split_whitespace() {
            let too_long = || ScriptError::TooLong(token.to_string());

            if let Some(pause) = token.strip_prefix('~') {
                let ms: u64 = pause
                    .parse()
                    .map_err(|_| ScriptError::InvalidPause(token.to_string()))?;
                at = at.checked_add(ms).ok_or_else(too_long)?;
                continue;
            }

            let mut chars = token.chars();
            let key = chars
                .next()
                .and_then(Key::from_char)
                .ok_or_else(|| ScriptError::UnknownKey(token.to_string()))?;
            let hold = match chars.as_str() {
                "" => SCRIPT_TAP_MS,
                "-" => SCRIPT_NORMAL_MS,
                "_" => SCRIPT_LONG_MS,
                _ => return Err(ScriptError::UnknownKey(token.to_string())),
            };
            let released_at = at.checked_add(hold).ok_or_else(too_long)?;
            presses.push(ScheduledPress {
                key,
                pressed_at: at,
                released_at,
            });
            at = released_at.checked_add(SCRIPT_GAP_MS).ok_or_else(too_long)?;
        }
        self.presses.extend(presses);
        Ok(at)
    }

    /// Whether a scheduled press has not ended yet.
    pub fn has_pending(&self) -> bool {
        let now = self.clock.now_ms();
        self.presses.iter().any(|p| p.released_at > now)
    }

    /// Disconnects a row from the matrix.
    pub fn cut_row(&mut self, row: usize) -> IoResult<()> {
        let cut = self.cut_rows.get_mut(row).ok_or(IoError::InvalidArgument)?;
        *cut = true;
        Ok(())
    }

    /// Adds `per_row` ADC counts of crosstalk to a column for every driven row.
    pub fn leak_column(&mut self, col: usize, per_row: u16) -> IoResult<()> {
        let leak = self.column_leak.get_mut(col).ok_or(IoError::InvalidArgument)?;
        *leak = per_row;
        Ok(())
    }

    /// Which keypad rows are currently driven high.
    pub fn driven_rows(&self) -> [bool; ROWS] {
        let mut driven = [false; ROWS];
        for (row, &pin) in self.wiring.rows.iter().enumerate() {
            driven[row] = self.output_level(pin);
        }
        driven
    }

    fn validate(pin: Pin) -> IoResult<()> {
        if Self::MCU_PINS.contains(&pin) && Self::RESERVED_MCU_PINS.contains(&pin) {
            return Err(IoError::InvalidPin(pin));
        }
        if Self::MCU_PINS.contains(&pin)
            || Self::MUX_PINS.contains(&pin)
            || Self::SHIFT_PINS.contains(&pin)
        {
            Ok(())
        } else {
            Err(IoError::InvalidPin(pin))
        }
    }

    fn output_level(&self, pin: Pin) -> bool {
        if Self::SHIFT_PINS.contains(&pin) {
            self.shift_register[(pin - 200) as usize]
        } else if Self::MCU_PINS.contains(&pin) {
            self.mcu_pins[pin as usize]
        } else {
            false
        }
    }

    fn column_reading(&self, col: usize) -> u16 {
        let now = self.clock.now_ms();
        let driven = self.driven_rows();

        let closed = self.presses.iter().any(|p| {
            let pos = p.key.position();
            let row = pos.row as usize;
            pos.col as usize == col
                && p.pressed_at <= now
                && now < p.released_at
                && driven[row]
                && !self.cut_rows[row]
        });
        if closed {
            return ADC_MAX;
        }

        let driven_count = driven.iter().filter(|&&d| d).count() as u16;
        (self.column_leak[col].saturating_mul(driven_count)).min(ADC_MAX)
    }
}

impl Debug for SimKeypad {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimKeypad(shift register {:08b})", self.shift_register.load_be::<u8>())
    }
}

impl VirtualIo for SimKeypad {
    fn set(&mut self, pin: Pin, state: bool) -> IoResult<()> {
        Self::validate(pin)?;
        if Self::SHIFT_PINS.contains(&pin) {
            self.shift_register.set((pin - 200) as usize, state);
            trace!("Shift register -> {:08b}", self.shift_register.load_be::<u8>());
            Ok(())
        } else if Self::MCU_PINS.contains(&pin) {
            self.mcu_pins.set(pin as usize, state);
            Ok(())
        } else {
            Err(IoError::NotSupported)
        }
    }

    fn read_digital(&mut self, pin: Pin) -> IoResult<bool> {
        Self::validate(pin)?;
        if Self::MUX_PINS.contains(&pin) {
            Ok(self.read_analog(pin)? > DIGITAL_HIGH_THRESHOLD)
        } else if Self::MCU_PINS.contains(&pin) {
            Ok(self.mcu_pins[pin as usize])
        } else {
            Err(IoError::NotSupported)
        }
    }

    fn read_analog(&mut self, pin: Pin) -> IoResult<u16> {
        Self::validate(pin)?;
        if Self::MUX_PINS.contains(&pin) {
            let reading = match self.wiring.cols.iter().position(|&c| c == pin) {
                Some(col) => self.column_reading(col),
                None => 0,
            };
            Ok(reading)
        } else if Self::MCU_PINS.contains(&pin) {
            Ok(if self.mcu_pins[pin as usize] { ADC_MAX } else { 0 })
        } else {
            Err(IoError::NotSupported)
        }
    }
}

/// One call made on a [RecordingDisplay].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DrawCall {
    Text(String, u8),
    Number(u32, u8),
    Password(String),
    Lines(String, u8, String, u8),
    Clear,
}

/// A [DisplayDriver] that remembers every draw.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    calls: Vec<DrawCall>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn last(&self) -> Option<&DrawCall> {
        self.calls.last()
    }

    pub fn take_calls(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.calls)
    }

    fn record(&mut self, call: DrawCall) -> IoResult<()> {
        info!("[display] {:?}", call);
        self.calls.push(call);
        Ok(())
    }
}

impl DisplayDriver for RecordingDisplay {
    fn draw_text(&mut self, text: &str, size: u8) -> IoResult<()> {
        self.record(DrawCall::Text(text.to_string(), size))
    }

    fn draw_number(&mut self, value: u32, size: u8) -> IoResult<()> {
        self.record(DrawCall::Number(value, size))
    }

    fn draw_password(&mut self, masked: &str) -> IoResult<()> {
        self.record(DrawCall::Password(masked.to_string()))
    }

    fn clear(&mut self) -> IoResult<()> {
        self.record(DrawCall::Clear)
    }

    fn draw_lines(&mut self, line1: &str, size1: u8, line2: &str, size2: u8) -> IoResult<()> {
        self.record(DrawCall::Lines(line1.to_string(), size1, line2.to_string(), size2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_namespace() {
        let mut keypad = SimKeypad::new(SimClock::new(), KeypadWiring::default());
        assert_eq!(keypad.set(5, true), Err(IoError::InvalidPin(5)));
        assert_eq!(keypad.set(50, true), Err(IoError::InvalidPin(50)));
        assert_eq!(keypad.set(101, true), Err(IoError::NotSupported));
        assert_eq!(keypad.read_analog(203), Err(IoError::NotSupported));

        keypad.set(2, true).unwrap();
        assert!(keypad.read_digital(2).unwrap());
        keypad.set(203, true).unwrap();
        assert_eq!(keypad.driven_rows(), [false, false, true, false]);
    }

    #[test]
    fn column_follows_driven_row() {
        let clock = SimClock::new();
        let mut keypad = SimKeypad::new(clock.clone(), KeypadWiring::default());
        keypad.press(Key::Key8, 0, 100);

        assert_eq!(keypad.read_analog(101).unwrap(), 0);
        keypad.set(203, true).unwrap();
        assert_eq!(keypad.read_analog(101).unwrap(), ADC_MAX);
        assert!(keypad.read_digital(101).unwrap());
        assert_eq!(keypad.read_analog(100).unwrap(), 0);

        clock.set(100);
        assert_eq!(keypad.read_analog(101).unwrap(), 0);
    }

    #[test]
    fn script_schedules_presses() {
        let clock = SimClock::new();
        let mut keypad = SimKeypad::new(clock.clone(), KeypadWiring::default());
        let end = keypad.schedule("2 2- ~500 #_", 10).unwrap();
        assert_eq!(end, 10 + 80 + 120 + 300 + 120 + 500 + 1200 + 120);
        assert!(keypad.has_pending());
        clock.set(end);
        assert!(!keypad.has_pending());

        assert_eq!(
            keypad.schedule("2 x", 0),
            Err(ScriptError::UnknownKey("x".to_string()))
        );
        assert_eq!(
            keypad.schedule("~abc", 0),
            Err(ScriptError::InvalidPause("~abc".to_string()))
        );
        assert_eq!(
            keypad.schedule("5+", 0),
            Err(ScriptError::UnknownKey("5+".to_string()))
        );
    }

    #[test]
    fn oversized_script_is_rejected_whole() {
        let clock = SimClock::new();
        let mut keypad = SimKeypad::new(clock.clone(), KeypadWiring::default());
        assert_eq!(
            keypad.schedule("~18446744073709551615 5", 0),
            Err(ScriptError::TooLong("5".to_string()))
        );
        assert_eq!(
            keypad.schedule("~18446744073709551615 ~1", 0),
            Err(ScriptError::TooLong("~1".to_string()))
        );
        assert_eq!(
            keypad.schedule("3 3 x", 0),
            Err(ScriptError::UnknownKey("x".to_string()))
        );
        assert!(!keypad.has_pending());
    }

    #[test]
    fn faults_outside_the_matrix_are_rejected() {
        let mut keypad = SimKeypad::new(SimClock::new(), KeypadWiring::default());
        assert_eq!(keypad.cut_row(ROWS), Err(IoError::InvalidArgument));
        assert_eq!(keypad.leak_column(3, 100), Err(IoError::InvalidArgument));
        assert_eq!(keypad.cut_row(0), Ok(()));
        assert_eq!(keypad.leak_column(2, 100), Ok(()));
    }
}

use std::fmt::{Debug, Formatter};
use log::{debug, trace};
use crate::debounce::TimedDebounce;
use crate::keypad::{classify, Key, KeyEvent, KeyPosition, PressKind, ScanTiming};
use crate::{Clock, IoResult, Pin, VirtualIo};

/// Number of driven rows.
pub const ROWS: usize = 4;
/// Number of read columns.
pub const COLS: usize = 3;

/// Where the keypad matrix is wired in the virtual pin namespace.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeypadWiring {
    /// Row outputs (shift register), top to bottom.
    pub rows: [Pin; ROWS],
    /// Column inputs (analog multiplexer), left to right.
    pub cols: [Pin; COLS],
    /// ADC reading above which a column counts as active.
    pub analog_threshold: u16,
}

impl Default for KeypadWiring {
    fn default() -> Self {
        KeypadWiring {
            rows: [201, 202, 203, 204],
            cols: [100, 101, 102],
            analog_threshold: 2500,
        }
    }
}

/// Scans the keypad matrix through [VirtualIo] and classifies presses.
///
/// Rows idle low. A scan drives every row high and only watches the columns, so nothing
/// switches until a key actually connects a row to a column. Once a column is active the rows
/// are driven one at a time to find which one closes it.
pub struct MatrixScanner<'a> {
    io: &'a mut dyn VirtualIo,
    clock: &'a dyn Clock,
    pub wiring: KeypadWiring,
    pub timing: ScanTiming,
    /// Column of a key returned as [PressKind::Long] that has not been released yet.
    held_col: Option<usize>,
}

impl Debug for MatrixScanner<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MatrixScanner({:?}, {:?})", self.io, self.wiring)
    }
}

impl<'a> MatrixScanner<'a> {
    /// Creates a scanner and drives every row to its idle level.
    pub fn new(
        io: &'a mut dyn VirtualIo,
        clock: &'a dyn Clock,
        wiring: KeypadWiring,
        timing: ScanTiming,
    ) -> IoResult<Self> {
        let mut scanner = MatrixScanner {
            io,
            clock,
            wiring,
            timing,
            held_col: None,
        };
        scanner.release_rows()?;
        Ok(scanner)
    }

    pub fn clock(&self) -> &'a dyn Clock {
        self.clock
    }

    /// Waits up to `timeout_ms` for a key and classifies the press.
    ///
    /// Blocks for as long as the key stays held, up to the auto-return threshold.
    /// Wiring faults are indistinguishable from an idle keypad and show up as
    /// [KeyEvent::Timeout].
    pub fn scan(&mut self, timeout_ms: u64, long_press_armed: bool) -> IoResult<KeyEvent> {
        self.scan_within(timeout_ms, long_press_armed)
    }

    /// Like [Self::scan], but gives up after [ScanTiming::fast_return_ms] of inactivity even
    /// when `timeout_ms` is longer.
    pub fn scan_fast(&mut self, timeout_ms: u64, long_press_armed: bool) -> IoResult<KeyEvent> {
        self.scan_within(timeout_ms.min(self.timing.fast_return_ms), long_press_armed)
    }

    /// Checks whether any key closes a column right now, without classifying anything.
    pub fn is_any_key_active(&mut self) -> IoResult<bool> {
        self.io.set_all(&self.wiring.rows, true)?;
        let active = self.find_active_column();
        self.release_rows()?;
        Ok(active?.is_some())
    }

    fn scan_within(&mut self, timeout_ms: u64, long_press_armed: bool) -> IoResult<KeyEvent> {
        let deadline = self.clock.now_ms().saturating_add(timeout_ms);

        self.io.set_all(&self.wiring.rows, true)?;
        let col = loop {
            if let Some(col) = self.find_active_column()? {
                break col;
            }
            if self.clock.now_ms() >= deadline {
                self.release_rows()?;
                trace!("No key within {} ms", timeout_ms);
                return Ok(KeyEvent::Timeout);
            }
            self.clock.sleep_ms(self.timing.poll_interval_ms);
        };

        let Some(row) = self.find_row(col)? else {
            self.release_rows()?;
            debug!("Column {} active but no row closes it, treating as timeout", col);
            return Ok(KeyEvent::Timeout);
        };

        let position = KeyPosition { row: row as u8, col: col as u8 };
        let Some(key) = Key::from_position(position) else {
            self.release_rows()?;
            return Ok(KeyEvent::Timeout);
        };

        let kind = self.classify_press(col, long_press_armed);
        self.release_rows()?;
        let kind = kind?;

        if kind == PressKind::Long {
            self.held_col = Some(col);
        }

        debug!("Key {} ({:?}) at {:?}", key.to_char(), kind, position);
        Ok(KeyEvent::Press { key, kind })
    }

    /// Returns the first active column, skipping a column still held from a long press.
    fn find_active_column(&mut self) -> IoResult<Option<usize>> {
        for col in 0..COLS {
            let active = self.column_active(col)?;
            if self.held_col == Some(col) {
                if !active {
                    trace!("Long-pressed column {} released", col);
                    self.held_col = None;
                }
                continue;
            }
            if active {
                return Ok(Some(col));
            }
        }
        Ok(None)
    }

    /// Drives the rows one at a time until `col` reads active.
    ///
    /// Leaves the matching row driven, or all rows idle when none matches.
    fn find_row(&mut self, col: usize) -> IoResult<Option<usize>> {
        self.release_rows()?;
        for row in 0..ROWS {
            let pin = self.wiring.rows[row];
            self.io.set(pin, true)?;
            if self.column_active(col)? {
                return Ok(Some(row));
            }
            self.io.set(pin, false)?;
        }
        Ok(None)
    }

    /// Polls `col` until the key is released or the auto-return threshold elapses.
    ///
    /// A release is timed from its first raw edge, not from when the debounce accepts it.
    fn classify_press(&mut self, col: usize, long_press_armed: bool) -> IoResult<PressKind> {
        let pressed_at = self.clock.now_ms();
        let mut held = TimedDebounce::new(true).with_debounce_ms(self.timing.debounce_ms);
        let mut released_at = None;

        loop {
            let now = self.clock.now_ms();
            let raw = self.column_active(col)?;
            if raw {
                released_at = None;
            } else if released_at.is_none() {
                released_at = Some(now);
            }

            let still_held = held.update(raw, now);
            let elapsed = match released_at {
                Some(at) if !still_held => at,
                _ => now,
            }
            .saturating_sub(pressed_at);
            if let Some(kind) = classify(elapsed, !still_held, long_press_armed, &self.timing) {
                trace!("Press classified as {:?} after {} ms", kind, elapsed);
                return Ok(kind);
            }
            self.clock.sleep_ms(self.timing.poll_interval_ms);
        }
    }

    fn column_active(&mut self, col: usize) -> IoResult<bool> {
        let value = self.io.read_analog(self.wiring.cols[col])?;
        Ok(value > self.wiring.analog_threshold)
    }

    fn release_rows(&mut self) -> IoResult<()> {
        self.io.set_all(&self.wiring.rows, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimClock, SimKeypad};

    fn scanner_parts() -> (SimClock, SimKeypad) {
        let clock = SimClock::new();
        let keypad = SimKeypad::new(clock.clone(), KeypadWiring::default());
        (clock, keypad)
    }

    #[test]
    fn times_out_on_idle_keypad() {
        let (clock, mut keypad) = scanner_parts();
        let mut scanner = MatrixScanner::new(&mut keypad, &clock, KeypadWiring::default(), ScanTiming::default()).unwrap();
        assert_eq!(scanner.scan(200, true).unwrap(), KeyEvent::Timeout);
        assert!(clock.now_ms() >= 200);
        drop(scanner);
        assert!(keypad.driven_rows().iter().all(|driven| !driven));
    }

    #[test]
    fn finds_every_key() {
        for key in Key::ALL {
            let (clock, mut keypad) = scanner_parts();
            keypad.press(key, 10, 60);
            let mut scanner = MatrixScanner::new(&mut keypad, &clock, KeypadWiring::default(), ScanTiming::default()).unwrap();
            assert_eq!(
                scanner.scan(500, true).unwrap(),
                KeyEvent::Press { key, kind: PressKind::Short },
            );
        }
    }

    #[test]
    fn classifies_press_lengths() {
        let (clock, mut keypad) = scanner_parts();
        keypad.press(Key::Key5, 0, 300);
        keypad.press(Key::Key5, 400, 2000);
        keypad.press(Key::Key7, 2100, 2200);
        let mut scanner = MatrixScanner::new(&mut keypad, &clock, KeypadWiring::default(), ScanTiming::default()).unwrap();

        let normal = scanner.scan(1000, true).unwrap();
        assert_eq!(normal, KeyEvent::Press { key: Key::Key5, kind: PressKind::Normal });

        let long = scanner.scan(1000, true).unwrap();
        assert_eq!(long, KeyEvent::Press { key: Key::Key5, kind: PressKind::Long });
        let returned_at = clock.now_ms();
        assert!(returned_at >= 1400 && returned_at < 1450, "returned at {}", returned_at);

        // The long-pressed key is still down and must not register again.
        let next = scanner.scan(2000, true).unwrap();
        assert_eq!(next, KeyEvent::Press { key: Key::Key7, kind: PressKind::Short });
    }

    #[test]
    fn tap_is_timed_to_the_raw_release() {
        let (clock, mut keypad) = scanner_parts();
        keypad.press(Key::Key3, 0, 145);
        keypad.press(Key::Key3, 300, 460);
        let mut scanner = MatrixScanner::new(&mut keypad, &clock, KeypadWiring::default(), ScanTiming::default()).unwrap();
        assert_eq!(
            scanner.scan(100, true).unwrap(),
            KeyEvent::Press { key: Key::Key3, kind: PressKind::Short }
        );
        assert!(clock.now_ms() >= 160, "returned at {}", clock.now_ms());
        assert_eq!(
            scanner.scan(500, true).unwrap(),
            KeyEvent::Press { key: Key::Key3, kind: PressKind::Normal }
        );
    }

    #[test]
    fn unarmed_press_auto_returns_early() {
        let (clock, mut keypad) = scanner_parts();
        keypad.press(Key::KeyHash, 0, 1000);
        let mut scanner = MatrixScanner::new(&mut keypad, &clock, KeypadWiring::default(), ScanTiming::default()).unwrap();
        let event = scanner.scan(100, false).unwrap();
        assert_eq!(event, KeyEvent::Press { key: Key::KeyHash, kind: PressKind::Long });
        assert!(clock.now_ms() < 500);
    }

    #[test]
    fn fast_scan_gives_up_early() {
        let (clock, mut keypad) = scanner_parts();
        keypad.press(Key::Key1, 1000, 1050);
        let mut scanner = MatrixScanner::new(&mut keypad, &clock, KeypadWiring::default(), ScanTiming::default()).unwrap();
        assert_eq!(scanner.scan_fast(5000, true).unwrap(), KeyEvent::Timeout);
        let now = clock.now_ms();
        assert!(now >= 350 && now < 400, "returned at {}", now);
    }

    #[test]
    fn probe_sees_held_key() {
        let (clock, mut keypad) = scanner_parts();
        keypad.press(Key::Key0, 0, 100);
        let mut scanner = MatrixScanner::new(&mut keypad, &clock, KeypadWiring::default(), ScanTiming::default()).unwrap();
        assert!(scanner.is_any_key_active().unwrap());
        clock.advance(200);
        assert!(!scanner.is_any_key_active().unwrap());
    }

    #[test]
    fn cut_row_reads_as_timeout() {
        let (clock, mut keypad) = scanner_parts();
        keypad.cut_row(1).unwrap();
        keypad.press(Key::Key5, 0, 100);
        let mut scanner = MatrixScanner::new(&mut keypad, &clock, KeypadWiring::default(), ScanTiming::default()).unwrap();
        assert_eq!(scanner.scan(50, true).unwrap(), KeyEvent::Timeout);
        assert!(clock.now_ms() >= 50);
    }

    #[test]
    fn column_without_row_reads_as_timeout() {
        let (clock, mut keypad) = scanner_parts();
        // Enough crosstalk to trip the threshold with all rows driven, but not with one.
        keypad.leak_column(2, 700).unwrap();
        let mut scanner = MatrixScanner::new(&mut keypad, &clock, KeypadWiring::default(), ScanTiming::default()).unwrap();
        assert_eq!(scanner.scan(1000, true).unwrap(), KeyEvent::Timeout);
        assert_eq!(clock.now_ms(), 0);
        drop(scanner);
        assert!(keypad.driven_rows().iter().all(|driven| !driven));
    }
}

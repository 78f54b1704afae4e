//! Telephone-style multi-tap text entry.
//!
//! Each digit key owns a short list of candidate characters. Quick repeated taps of the same
//! key walk through the list, a different key (or a pause longer than the tap window) commits
//! the character, and holding a digit types the digit itself.

use std::fmt::{Debug, Formatter};
use log::{debug, info};
use kiosk_io::IoResult;
use kiosk_io::keypad::{Key, KeyEvent, MatrixScanner, PressKind};
use crate::codec::{CodecError, PackedKeyState};

/// Which of the two candidate tables is in use.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum CaseTable {
    #[default]
    Lower,
    Upper,
}

impl CaseTable {
    pub fn toggled(self) -> Self {
        match self {
            CaseTable::Lower => CaseTable::Upper,
            CaseTable::Upper => CaseTable::Lower,
        }
    }

    /// Short sample shown to confirm the table switch.
    pub fn label(self) -> &'static str {
        match self {
            CaseTable::Lower => "abc",
            CaseTable::Upper => "ABC",
        }
    }
}

/// What a candidate slot produces.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Glyph {
    Char(char),
    /// Switches between the lower and upper tables instead of typing anything.
    ToggleCase,
}

/// Candidate characters for the digit keys, one list per [CaseTable].
///
/// The last candidate of key `0` is the case-toggle glyph.
#[derive(Clone, Eq, PartialEq)]
pub struct MultiTapTables {
    lower: [Vec<char>; 10],
    upper: [Vec<char>; 10],
}

impl MultiTapTables {
    /// A packed key state has room for eight candidates.
    pub const MAX_CANDIDATES: usize = 8;

    pub const DEFAULT_LOWER: [&'static str; 10] = [
        " 0>", ".!?-1", "abc2", "def3", "ghi4", "jkl5", "mno6", "pqrs7", "tuv8", "wxyz9",
    ];

    pub const DEFAULT_UPPER: [&'static str; 10] = [
        " 0<", ".!?-1", "ABC2", "DEF3", "GHI4", "JKL5", "MNO6", "PQRS7", "TUV8", "WXYZ9",
    ];

    /// Builds tables from one candidate string per digit key.
    ///
    /// # Errors
    /// - `CodecError::InvalidTable` if a list is empty, longer than
    ///   [Self::MAX_CANDIDATES] or misses its own digit, or if the digit sits in the
    ///   case-toggle slot of key `0`.
    pub fn new(lower: [&str; 10], upper: [&str; 10]) -> Result<Self, CodecError> {
        fn build(table: [&str; 10]) -> Result<[Vec<char>; 10], CodecError> {
            let mut out: [Vec<char>; 10] = Default::default();
            for (digit, candidates) in table.iter().enumerate() {
                let chars: Vec<char> = candidates.chars().collect();
                let own_digit = char::from_digit(digit as u32, 10);
                let digit_at = chars.iter().position(|&c| Some(c) == own_digit);
                let valid = match digit_at {
                    None => false,
                    // A held digit must never be stored as the toggle.
                    Some(index) if digit == 0 => index + 1 < chars.len(),
                    Some(_) => true,
                };
                if !valid || chars.len() > MultiTapTables::MAX_CANDIDATES {
                    return Err(CodecError::InvalidTable(digit as u8));
                }
                out[digit] = chars;
            }
            Ok(out)
        }

        Ok(MultiTapTables {
            lower: build(lower)?,
            upper: build(upper)?,
        })
    }

    pub fn candidates(&self, case: CaseTable, digit: u8) -> &[char] {
        let table = match case {
            CaseTable::Lower => &self.lower,
            CaseTable::Upper => &self.upper,
        };
        &table[digit as usize % 10]
    }

    /// Looks up the glyph at `index`, clamping to the last candidate.
    pub fn glyph(&self, case: CaseTable, digit: u8, index: u8) -> Glyph {
        let candidates = self.candidates(case, digit);
        let last = candidates.len() - 1;
        let index = (index as usize).min(last);
        if digit == 0 && index == last && last > 0 {
            Glyph::ToggleCase
        } else {
            Glyph::Char(candidates[index])
        }
    }

    /// Highest index quick taps can reach.
    ///
    /// Lists that end in their own digit stop one short of it: the digit is typed by holding
    /// the key. Other lists (key `0`, ending in the toggle glyph) can reach their last entry.
    pub fn cycle_limit(&self, case: CaseTable, digit: u8) -> u8 {
        let candidates = self.candidates(case, digit);
        let last = candidates.len() - 1;
        let own_digit = char::from_digit(digit as u32, 10);
        if last > 0 && candidates.last().copied() == own_digit {
            (last - 1) as u8
        } else {
            last as u8
        }
    }

    /// Index of the digit itself in its own list, used when the digit is typed directly.
    pub fn digit_index(&self, case: CaseTable, digit: u8) -> u8 {
        let candidates = self.candidates(case, digit);
        let own_digit = char::from_digit(digit as u32, 10);
        candidates
            .iter()
            .position(|&c| Some(c) == own_digit)
            .unwrap_or(candidates.len() - 1) as u8
    }
}

impl Default for MultiTapTables {
    fn default() -> Self {
        let build = |table: [&str; 10]| -> [Vec<char>; 10] {
            table.map(|candidates| candidates.chars().collect())
        };
        MultiTapTables {
            lower: build(Self::DEFAULT_LOWER),
            upper: build(Self::DEFAULT_UPPER),
        }
    }
}

impl Debug for MultiTapTables {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let lower: Vec<String> = self.lower.iter().map(|c| c.iter().collect()).collect();
        let upper: Vec<String> = self.upper.iter().map(|c| c.iter().collect()).collect();
        f.debug_struct("MultiTapTables")
            .field("lower", &lower)
            .field("upper", &upper)
            .finish()
    }
}

/// Mutable state of one decoder.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MultiTapState {
    pub active_table: CaseTable,
    /// Key whose candidates are being cycled, if any.
    pub last_key: Option<Key>,
    pub cycle_index: u8,
    pub last_press_at: u64,
}

/// What the decoder made of a key press.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeOutput {
    /// A character was typed.
    ///
    /// `replaces_previous` is set when it is the next candidate of the character typed just
    /// before, which it replaces.
    Char {
        ch: char,
        packed: PackedKeyState,
        replaces_previous: bool,
    },
    /// The case-toggle glyph was selected. No character is typed, but the packed state has to
    /// be kept so the toggle is replayed when the buffer is decoded.
    CaseToggled {
        table: CaseTable,
        packed: PackedKeyState,
        replaces_previous: bool,
    },
    /// `#`.
    Enter { long: bool },
    /// `*`.
    Delete,
}

impl DecodeOutput {
    /// The character as a caller reading plain characters sees it.
    pub fn as_char(&self) -> Option<char> {
        match self {
            DecodeOutput::Char { ch, .. } => Some(*ch),
            DecodeOutput::CaseToggled { .. } => None,
            DecodeOutput::Enter { .. } => Some('#'),
            DecodeOutput::Delete => Some('*'),
        }
    }
}

/// Turns key events into characters using [MultiTapTables].
#[derive(Debug)]
pub struct MultiTapDecoder {
    state: MultiTapState,
    tables: MultiTapTables,
    /// Taps of the same key closer than this keep cycling.
    pub window_ms: u64,
}

impl MultiTapDecoder {
    pub fn new(tables: MultiTapTables, window_ms: u64) -> Self {
        MultiTapDecoder {
            state: MultiTapState::default(),
            tables,
            window_ms,
        }
    }

    pub fn state(&self) -> &MultiTapState {
        &self.state
    }

    pub fn tables(&self) -> &MultiTapTables {
        &self.tables
    }

    /// Switches the candidate table, ending the current cycle.
    ///
    /// Used to resynchronise the decoder after a toggle was deleted from a line.
    pub fn set_active_table(&mut self, table: CaseTable) {
        if self.state.active_table != table {
            debug!("Active table set to {:?}", table);
        }
        self.commit();
        self.state.active_table = table;
    }

    /// Ends the current cycle, so the next tap starts a new character.
    pub fn commit(&mut self) {
        if self.state.last_key.take().is_some() {
            debug!("Committed multi-tap character");
        }
        self.state.cycle_index = 0;
    }

    /// Whether a tap of `key` at `now` would continue the current cycle.
    pub fn is_cycling(&self, key: Key, now: u64) -> bool {
        self.state.last_key == Some(key)
            && now.saturating_sub(self.state.last_press_at) <= self.window_ms
    }

    /// Scans for one key with long-press detection armed and decodes it.
    ///
    /// Returns `None` when the scan timed out or the press produced nothing.
    pub fn next_input(
        &mut self,
        scanner: &mut MatrixScanner,
        timeout_ms: u64,
    ) -> IoResult<Option<DecodeOutput>> {
        let event = scanner.scan(timeout_ms, true)?;
        let now = scanner.clock().now_ms();
        Ok(self.feed(event, now))
    }

    /// Blocks for the next character.
    ///
    /// `#` and `*` come back verbatim. Timeouts and case toggles produce `None`, so the caller
    /// must not move its cursor for them.
    pub fn decode_next_char(
        &mut self,
        scanner: &mut MatrixScanner,
        timeout_ms: u64,
    ) -> IoResult<Option<char>> {
        Ok(self.next_input(scanner, timeout_ms)?.and_then(|out| out.as_char()))
    }

    /// Decodes one key event observed at `now`.
    pub fn feed(&mut self, event: KeyEvent, now: u64) -> Option<DecodeOutput> {
        let (key, kind) = match event {
            KeyEvent::Timeout => {
                if self.state.last_key.is_some()
                    && now.saturating_sub(self.state.last_press_at) > self.window_ms
                {
                    self.commit();
                }
                return None;
            }
            KeyEvent::Press { key, kind } => (key, kind),
        };

        let Some(digit) = key.digit() else {
            self.commit();
            return Some(match key {
                Key::KeyHash => DecodeOutput::Enter { long: kind == PressKind::Long },
                _ => DecodeOutput::Delete,
            });
        };

        if kind == PressKind::Long {
            self.commit();
            let index = self.tables.digit_index(self.state.active_table, digit);
            return Some(DecodeOutput::Char {
                ch: key.to_char(),
                packed: PackedKeyState::for_key(key, index),
                replaces_previous: false,
            });
        }

        if kind == PressKind::Short && self.is_cycling(key, now) {
            let limit = self.tables.cycle_limit(self.state.active_table, digit);
            let next = (self.state.cycle_index + 1).min(limit);
            let clamped = next == self.state.cycle_index;
            self.state.last_press_at = now;

            let glyph = self.tables.glyph(self.state.active_table, digit, next);
            if clamped && glyph == Glyph::ToggleCase {
                // Selecting the toggle again must not flip the table back.
                return None;
            }
            self.state.cycle_index = next;
            return Some(self.emit(key, digit, next, glyph, true));
        }

        self.commit();
        self.state.last_key = Some(key);
        self.state.cycle_index = 0;
        self.state.last_press_at = now;
        let glyph = self.tables.glyph(self.state.active_table, digit, 0);
        Some(self.emit(key, digit, 0, glyph, false))
    }

    /// Decodes one key event as plain digit entry, bypassing the candidate tables.
    pub fn feed_digit(&mut self, event: KeyEvent) -> Option<DecodeOutput> {
        self.commit();
        let KeyEvent::Press { key, kind } = event else {
            return None;
        };
        Some(match key.digit() {
            Some(digit) => DecodeOutput::Char {
                ch: key.to_char(),
                packed: PackedKeyState::for_key(key, self.tables.digit_index(self.state.active_table, digit)),
                replaces_previous: false,
            },
            None if key == Key::KeyHash => DecodeOutput::Enter { long: kind == PressKind::Long },
            None => DecodeOutput::Delete,
        })
    }

    fn emit(&mut self, key: Key, digit: u8, index: u8, glyph: Glyph, replaces_previous: bool) -> DecodeOutput {
        let packed = PackedKeyState::for_key(key, index);
        match glyph {
            Glyph::Char(ch) => {
                debug!("Key {} candidate {} -> {:?}", digit, index, ch);
                DecodeOutput::Char {
                    ch,
                    packed,
                    replaces_previous,
                }
            }
            Glyph::ToggleCase => {
                self.state.active_table = self.state.active_table.toggled();
                info!("Switched to {:?} case", self.state.active_table);
                DecodeOutput::CaseToggled {
                    table: self.state.active_table,
                    packed,
                    replaces_previous,
                }
            }
        }
    }
}

impl Default for MultiTapDecoder {
    fn default() -> Self {
        Self::new(MultiTapTables::default(), 400)
    }
}

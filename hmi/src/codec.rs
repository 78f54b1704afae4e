//! One-byte encoding of a key together with its multi-tap position.
//!
//! A line being typed is kept as a list of these bytes rather than as text. The text is
//! rebuilt by replaying the bytes through the candidate tables, so deleting a character is
//! just dropping the last byte, even when a case toggle happened in between.

use std::fmt::{Debug, Formatter};
use thiserror::Error;
use kiosk_io::keypad::Key;
use crate::multitap::{CaseTable, Glyph, MultiTapTables};

/// Maximum number of packed key states in one line.
pub const MAX_LINE_KEYS: usize = 42;

/// State stored for `#`.
pub const ENTER_STATE: u8 = 7;
/// State stored for `*`.
pub const DELETE_STATE: u8 = 0;

const STATE_MASK: u8 = 0b0000_0111;
const KEY_SHIFT: u8 = 4;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum CodecError {
    #[error("key id {0} is out of range")]
    KeyOutOfRange(u8),
    #[error("cycle state {0} does not fit in three bits")]
    StateOutOfRange(u8),
    #[error("key buffer is full")]
    BufferFull,
    #[error("candidate list for key {0} must hold 1 to 8 characters including its digit")]
    InvalidTable(u8),
}

/// A key id (high nibble) and a cycle index (low three bits) in one byte.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PackedKeyState(u8);

impl PackedKeyState {
    /// Packs a key and its cycle index.
    ///
    /// `#` is always stored with [ENTER_STATE] and `*` with [DELETE_STATE].
    ///
    /// # Errors
    /// - `CodecError::StateOutOfRange` if `state` does not fit in three bits.
    pub fn pack(key: Key, state: u8) -> Result<Self, CodecError> {
        if state > STATE_MASK {
            return Err(CodecError::StateOutOfRange(state));
        }
        Ok(Self::for_key(key, state))
    }

    /// Like [Self::pack], but masks the state instead of rejecting it.
    pub(crate) fn for_key(key: Key, state: u8) -> Self {
        let state = match key {
            Key::KeyHash => ENTER_STATE,
            Key::KeyAsterisk => DELETE_STATE,
            _ => state & STATE_MASK,
        };
        PackedKeyState(key.id() << KEY_SHIFT | state)
    }

    /// Reads a stored byte back.
    ///
    /// # Errors
    /// - `CodecError::KeyOutOfRange` if the key id is not 0-11.
    pub fn from_byte(byte: u8) -> Result<Self, CodecError> {
        let id = byte >> KEY_SHIFT;
        let key = Key::from_id(id).ok_or(CodecError::KeyOutOfRange(id))?;
        Ok(Self::for_key(key, byte & STATE_MASK))
    }

    pub fn byte(self) -> u8 {
        self.0
    }

    pub fn key(self) -> Key {
        // The constructors only ever store valid ids.
        Key::from_id(self.0 >> KEY_SHIFT).unwrap_or(Key::KeyAsterisk)
    }

    pub fn state(self) -> u8 {
        self.0 & STATE_MASK
    }

    pub fn unpack(self) -> (Key, u8) {
        (self.key(), self.state())
    }
}

impl Debug for PackedKeyState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PackedKeyState({:#04x}: {}/{})", self.0, self.key().to_char(), self.state())
    }
}

/// Packs a raw key id and cycle index.
pub fn pack(key_id: u8, state: u8) -> Result<u8, CodecError> {
    let key = Key::from_id(key_id).ok_or(CodecError::KeyOutOfRange(key_id))?;
    Ok(PackedKeyState::pack(key, state)?.byte())
}

/// Splits a stored byte into its key id and cycle index.
pub fn unpack(byte: u8) -> Result<(u8, u8), CodecError> {
    let packed = PackedKeyState::from_byte(byte)?;
    Ok((packed.key().id(), packed.state()))
}

/// Rebuilds the text of a line by replaying its packed key states in order.
///
/// Decoding starts in the `initial` table. Toggle entries switch tables and produce no
/// character; `#` and `*` entries are control keys and produce nothing either.
pub fn decode_buffer(states: &[PackedKeyState], tables: &MultiTapTables, initial: CaseTable) -> String {
    replay(states, tables, initial).0
}

/// Like [decode_buffer], but also returns the table that is active once every state has been
/// replayed.
pub fn replay(states: &[PackedKeyState], tables: &MultiTapTables, initial: CaseTable) -> (String, CaseTable) {
    let mut case = initial;
    let mut text = String::with_capacity(states.len());
    for state in states {
        let (key, index) = state.unpack();
        let Some(digit) = key.digit() else {
            continue;
        };
        match tables.glyph(case, digit, index) {
            Glyph::Char(c) => text.push(c),
            Glyph::ToggleCase => case = case.toggled(),
        }
    }
    (text, case)
}

/// The packed key states of the line being typed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyBuffer {
    states: Vec<PackedKeyState>,
    capacity: usize,
}

impl KeyBuffer {
    pub fn new(capacity: usize) -> Self {
        KeyBuffer {
            states: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a state.
    ///
    /// # Errors
    /// - `CodecError::BufferFull` if the buffer already holds `capacity` states.
    pub fn push(&mut self, state: PackedKeyState) -> Result<(), CodecError> {
        if self.states.len() >= self.capacity {
            return Err(CodecError::BufferFull);
        }
        self.states.push(state);
        Ok(())
    }

    /// Replaces the last state, or appends when the buffer is empty.
    pub fn replace_last(&mut self, state: PackedKeyState) -> Result<(), CodecError> {
        match self.states.last_mut() {
            Some(last) => {
                *last = state;
                Ok(())
            }
            None => self.push(state),
        }
    }

    pub fn pop(&mut self) -> Option<PackedKeyState> {
        self.states.pop()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn as_slice(&self) -> &[PackedKeyState] {
        &self.states
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.states.iter().map(|s| s.byte()).collect()
    }

    pub fn decode(&self, tables: &MultiTapTables, initial: CaseTable) -> String {
        decode_buffer(&self.states, tables, initial)
    }
}

impl Default for KeyBuffer {
    fn default() -> Self {
        Self::new(MAX_LINE_KEYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multitap::{DecodeOutput, MultiTapDecoder};
    use kiosk_io::keypad::{KeyEvent, PressKind};
    use proptest::prelude::*;

    #[test]
    fn layout() {
        assert_eq!(pack(2, 1), Ok(0x21));
        assert_eq!(pack(11, 3), Ok(0xB7));
        assert_eq!(pack(10, 5), Ok(0xA0));
        assert_eq!(pack(12, 0), Err(CodecError::KeyOutOfRange(12)));
        assert_eq!(pack(1, 8), Err(CodecError::StateOutOfRange(8)));
        assert_eq!(unpack(0x94), Ok((9, 4)));
        assert_eq!(unpack(0xF0), Err(CodecError::KeyOutOfRange(15)));
    }

    #[test]
    fn toggle_is_consumed() {
        let tables = MultiTapTables::default();
        let bytes = [0x20, 0x02, 0x21, 0x02, 0x30];
        let states: Vec<_> = bytes.iter().map(|&b| PackedKeyState::from_byte(b).unwrap()).collect();
        assert_eq!(decode_buffer(&states, &tables, CaseTable::Lower), "aBd");
        assert_eq!(decode_buffer(&states, &tables, CaseTable::Upper), "AbD");
        assert_eq!(replay(&states[..3], &tables, CaseTable::Lower), ("aB".to_string(), CaseTable::Upper));
    }

    #[test]
    fn buffer_capacity_and_undo() {
        let mut buffer = KeyBuffer::new(2);
        buffer.push(PackedKeyState::for_key(Key::Key2, 0)).unwrap();
        buffer.replace_last(PackedKeyState::for_key(Key::Key2, 2)).unwrap();
        buffer.push(PackedKeyState::for_key(Key::Key3, 1)).unwrap();
        assert_eq!(buffer.push(PackedKeyState::for_key(Key::Key4, 0)), Err(CodecError::BufferFull));
        assert_eq!(buffer.to_bytes(), vec![0x22, 0x31]);

        let tables = MultiTapTables::default();
        assert_eq!(buffer.decode(&tables, CaseTable::Lower), "ce");
        buffer.pop();
        assert_eq!(buffer.decode(&tables, CaseTable::Lower), "c");
    }

    fn tap_events() -> impl Strategy<Value = Vec<(u8, PressKind, u64)>> {
        // (digit, press kind, gap before the press)
        let kind = prop_oneof![
            4 => Just(PressKind::Short),
            1 => Just(PressKind::Normal),
            1 => Just(PressKind::Long),
        ];
        prop::collection::vec((0u8..10, kind, 50u64..900), 0..30)
    }

    #[test]
    fn held_zero_replays_as_digit() {
        let mut decoder = MultiTapDecoder::default();
        let held = decoder.feed(KeyEvent::Press { key: Key::Key0, kind: PressKind::Long }, 0);
        let tapped = decoder.feed(KeyEvent::Press { key: Key::Key2, kind: PressKind::Short }, 500);
        let mut buffer = KeyBuffer::new(4);
        for out in [held, tapped] {
            let Some(DecodeOutput::Char { packed, .. }) = out else { panic!("expected a character, got {:?}", out) };
            buffer.push(packed).unwrap();
        }
        assert_eq!(buffer.decode(decoder.tables(), CaseTable::Lower), "0a");
    }

    proptest! {
        #[test]
        fn replay_matches_live_decoding(events in tap_events()) {
            let mut decoder = MultiTapDecoder::default();
            let tables = MultiTapTables::default();
            // One entry per stored key state; toggles type nothing.
            let mut typed: Vec<Option<char>> = Vec::new();
            let mut buffer = KeyBuffer::new(64);
            let mut now = 0;

            for (digit, kind, gap) in events {
                now += gap;
                let key = Key::from_id(digit).unwrap();
                let (entry, packed, replaces_previous) = match decoder.feed(KeyEvent::Press { key, kind }, now) {
                    Some(DecodeOutput::Char { ch, packed, replaces_previous }) => (Some(ch), packed, replaces_previous),
                    Some(DecodeOutput::CaseToggled { packed, replaces_previous, .. }) => (None, packed, replaces_previous),
                    // Tapping on past the toggle.
                    None => continue,
                    other => {
                        prop_assert!(false, "unexpected output {:?}", other);
                        continue;
                    }
                };
                if replaces_previous {
                    typed.pop();
                    buffer.replace_last(packed).unwrap();
                } else {
                    buffer.push(packed).unwrap();
                }
                typed.push(entry);
            }

            let live: String = typed.into_iter().flatten().collect();
            let (replayed, table) = replay(buffer.as_slice(), &tables, CaseTable::Lower);
            prop_assert_eq!(replayed, live);
            prop_assert_eq!(table, decoder.state().active_table);
        }

        #[test]
        fn bytes_survive_storage(id in 0u8..12, state in 0u8..8) {
            let byte = pack(id, state).unwrap();
            let (back_id, back_state) = unpack(byte).unwrap();
            prop_assert_eq!(back_id, id);
            match id {
                10 => prop_assert_eq!(back_state, DELETE_STATE),
                11 => prop_assert_eq!(back_state, ENTER_STATE),
                _ => prop_assert_eq!(back_state, state),
            }
        }
    }
}

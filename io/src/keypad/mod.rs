mod matrix;

pub use matrix::*;

/// Represents the keys on a 4x3 telephone keypad.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Key {
    /// The `0` key.
    Key0,
    /// The `1` key.
    Key1,
    /// The `2` key.
    Key2,
    /// The `3` key.
    Key3,
    /// The `4` key.
    Key4,
    /// The `5` key.
    Key5,
    /// The `6` key.
    Key6,
    /// The `7` key.
    Key7,
    /// The `8` key.
    Key8,
    /// The `9` key.
    Key9,
    /// The `*` key, used as delete.
    KeyAsterisk,
    /// The `#` key, used as enter.
    KeyHash,
}

impl Key {
    /// Every key, ordered by id.
    pub const ALL: [Key; 12] = {
        use Key::*;
        [Key0, Key1, Key2, Key3, Key4, Key5, Key6, Key7, Key8, Key9, KeyAsterisk, KeyHash]
    };

    /// Logical id: the digit for `0`-`9`, 10 for `*`, 11 for `#`.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Converts a logical id back to a [Key].
    pub fn from_id(id: u8) -> Option<Key> {
        Self::ALL.get(id as usize).copied()
    }

    /// Converts a matrix position to a [Key].
    pub fn from_position(pos: KeyPosition) -> Option<Key> {
        use Key::*;

        const KEYS: [[Key; 3]; 4] = [
            [ Key1, Key2, Key3, ],
            [ Key4, Key5, Key6, ],
            [ Key7, Key8, Key9, ],
            [ KeyAsterisk, Key0, KeyHash, ],
        ];

        if pos.row < 4 && pos.col < 3 {
            Some(KEYS[pos.row as usize][pos.col as usize])
        } else {
            None
        }
    }

    /// The matrix position of the key.
    pub fn position(self) -> KeyPosition {
        use Key::*;

        let (row, col) = match self {
            Key1 => (0, 0),
            Key2 => (0, 1),
            Key3 => (0, 2),
            Key4 => (1, 0),
            Key5 => (1, 1),
            Key6 => (1, 2),
            Key7 => (2, 0),
            Key8 => (2, 1),
            Key9 => (2, 2),
            KeyAsterisk => (3, 0),
            Key0 => (3, 1),
            KeyHash => (3, 2),
        };
        KeyPosition { row, col }
    }

    /// Converts the [Key] to its printed character.
    pub fn to_char(self) -> char {
        match self {
            Key::KeyAsterisk => '*',
            Key::KeyHash => '#',
            digit => (b'0' + digit.id()) as char,
        }
    }

    /// Converts a printed character to its [Key].
    pub fn from_char(c: char) -> Option<Key> {
        match c {
            '*' => Some(Key::KeyAsterisk),
            '#' => Some(Key::KeyHash),
            _ => c.to_digit(10).and_then(|d| Key::from_id(d as u8)),
        }
    }

    /// Returns the digit value for `0`-`9`.
    pub fn digit(self) -> Option<u8> {
        match self {
            Key::KeyAsterisk | Key::KeyHash => None,
            digit => Some(digit.id()),
        }
    }
}

/// A cell of the keypad matrix.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeyPosition {
    pub row: u8,
    pub col: u8,
}

/// How long a key was held.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PressKind {
    /// Released before the short-press threshold, with long-press detection armed.
    Short,
    /// Released in between, or any release without long-press detection.
    Normal,
    /// Still held when the auto-return threshold elapsed.
    Long,
}

/// The result of a single scan.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyEvent {
    Press { key: Key, kind: PressKind },
    /// No key was found within the scan window.
    Timeout,
}

impl KeyEvent {
    pub fn key(&self) -> Option<Key> {
        match self {
            KeyEvent::Press { key, .. } => Some(*key),
            KeyEvent::Timeout => None,
        }
    }
}

/// Timing thresholds for scanning and press classification, in milliseconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScanTiming {
    /// Releases before this are [PressKind::Short] when long-press detection is armed.
    pub short_press_ms: u64,
    /// Auto-return threshold with long-press detection armed.
    pub long_press_ms: u64,
    /// Auto-return threshold without long-press detection.
    pub auto_return_ms: u64,
    /// Column inactivity after which [MatrixScanner::scan_fast] gives up.
    pub fast_return_ms: u64,
    /// Pause between two polls of the matrix.
    pub poll_interval_ms: u64,
    /// Stability required before a release is accepted.
    pub debounce_ms: u64,
}

impl ScanTiming {
    /// The hold time after which a press is returned as [PressKind::Long].
    pub fn auto_return(&self, long_press_armed: bool) -> u64 {
        if long_press_armed {
            self.long_press_ms
        } else {
            self.auto_return_ms
        }
    }
}

impl Default for ScanTiming {
    fn default() -> Self {
        ScanTiming {
            short_press_ms: 155,
            long_press_ms: 1000,
            auto_return_ms: 450,
            fast_return_ms: 350,
            poll_interval_ms: 5,
            debounce_ms: 15,
        }
    }
}

/// Classifies a press from how long it has lasted and whether it is over.
///
/// Returns `None` while the key is still held and no threshold has been reached yet.
pub fn classify(
    elapsed_ms: u64,
    released: bool,
    long_press_armed: bool,
    timing: &ScanTiming,
) -> Option<PressKind> {
    if released {
        if long_press_armed && elapsed_ms < timing.short_press_ms {
            Some(PressKind::Short)
        } else {
            Some(PressKind::Normal)
        }
    } else if elapsed_ms >= timing.auto_return(long_press_armed) {
        Some(PressKind::Long)
    } else {
        None
    }
}

use std::fmt::{Debug, Formatter};

/// A debounced level that only accepts a change once it has been stable for a while.
///
/// Unlike a pin wrapper, it is fed raw samples together with their timestamp, so the same
/// logic works with any [Clock](crate::Clock).
pub struct TimedDebounce {
    state: bool,
    changed_since: Option<u64>,
    pub debounce_ms: u64,
}

impl TimedDebounce {
    pub fn new(initial: bool) -> Self {
        Self {
            state: initial,
            changed_since: None,
            debounce_ms: 15,
        }
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// The currently accepted level.
    pub fn state(&self) -> bool {
        self.state
    }

    /// Feeds a raw sample taken at `now` and returns the debounced level.
    pub fn update(&mut self, raw: bool, now: u64) -> bool {
        if raw == self.state {
            self.changed_since = None;
            return self.state;
        }

        match self.changed_since {
            Some(since) if now.saturating_sub(since) >= self.debounce_ms => {
                self.changed_since = None;
                self.state = raw;
            }
            Some(_) => {}
            None if self.debounce_ms == 0 => self.state = raw,
            None => self.changed_since = Some(now),
        }

        self.state
    }
}

impl Debug for TimedDebounce {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimedDebounce({}, {} ms)", self.state, self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_needs_to_be_stable() {
        let mut db = TimedDebounce::new(true).with_debounce_ms(10);
        assert!(db.update(false, 0));
        assert!(db.update(false, 5));
        assert!(!db.update(false, 10));
        assert!(!db.state());
    }

    #[test]
    fn glitch_is_ignored() {
        let mut db = TimedDebounce::new(true).with_debounce_ms(10);
        assert!(db.update(false, 0));
        assert!(db.update(true, 4));
        assert!(db.update(false, 8));
        assert!(db.update(false, 12));
        assert!(!db.update(false, 18));
    }

    #[test]
    fn zero_debounce_follows_input() {
        let mut db = TimedDebounce::new(true).with_debounce_ms(0);
        assert!(!db.update(false, 0));
        assert!(db.update(true, 0));
    }
}

//! Arbitration of the single display between competing producers.
//!
//! Producers request messages with an id and a priority (0 is the most urgent). The queue keeps
//! a handful of slots; on every [DisplayQueue::refresh] it decides whether the message on
//! screen stays, is preempted by a more urgent one, or hands over to the next message of the
//! same priority once its minimum dwell time is up.

use log::{debug, info, trace, warn};
use kiosk_io::display::{fit_line, DEFAULT_TEXT_SIZE};
use kiosk_io::{DisplayDriver, IoResult};

/// Number of slots of the default queue.
pub const DEFAULT_CAPACITY: usize = 5;

/// What a message draws.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DisplayPayload {
    Text(String),
    Number(u32),
    /// Drawn masked.
    Password(String),
    /// Two lines, each sized to fit.
    Lines(String, String),
}

/// A display request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DisplayMessage {
    pub id: u8,
    /// 0 is the most urgent.
    pub priority: u8,
    /// Minimum time on screen before a message of the same priority may replace it.
    pub min_dwell_ms: u64,
    /// Extra dwell granted when this message overwrites its own id while it is on screen.
    pub extra_on_overwrite_ms: u64,
    pub payload: DisplayPayload,
}

impl DisplayMessage {
    pub fn new(payload: DisplayPayload) -> Self {
        DisplayMessage {
            id: 0,
            priority: u8::MAX,
            min_dwell_ms: 2000,
            extra_on_overwrite_ms: 0,
            payload,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(DisplayPayload::Text(text.into()))
    }

    pub fn number(value: u32) -> Self {
        Self::new(DisplayPayload::Number(value))
    }

    pub fn password(input: impl Into<String>) -> Self {
        Self::new(DisplayPayload::Password(input.into()))
    }

    pub fn lines(line1: impl Into<String>, line2: impl Into<String>) -> Self {
        Self::new(DisplayPayload::Lines(line1.into(), line2.into()))
    }

    pub fn with_id(mut self, id: u8) -> Self {
        self.id = id;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_min_dwell_ms(mut self, min_dwell_ms: u64) -> Self {
        self.min_dwell_ms = min_dwell_ms;
        self
    }

    pub fn with_extra_on_overwrite_ms(mut self, extra_on_overwrite_ms: u64) -> Self {
        self.extra_on_overwrite_ms = extra_on_overwrite_ms;
        self
    }
}

/// Timing rules of the queue, in milliseconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueueTiming {
    /// Waiting messages older than this are dropped.
    pub stale_after_ms: u64,
    /// Upper bound of [DisplayMessage::extra_on_overwrite_ms].
    pub max_extra_on_overwrite_ms: u64,
    /// How long the last typed password character stays readable.
    pub password_reveal_ms: u64,
}

impl Default for QueueTiming {
    fn default() -> Self {
        QueueTiming {
            stale_after_ms: 3000,
            max_extra_on_overwrite_ms: 3000,
            password_reveal_ms: 150,
        }
    }
}

/// Lifecycle of a slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SlotState {
    Empty,
    Waiting,
    Active,
}

/// What [DisplayQueue::enqueue] did with a message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EnqueueOutcome {
    /// Stored in a free slot.
    Queued,
    /// Replaced a waiting message with the same id.
    Overwritten,
    /// Replaced the message on screen, which now has to stay for `dwell_ms` more.
    ActiveUpdated { dwell_ms: u64 },
    /// Took the slot of a less urgent waiting message.
    Evicted { evicted_id: u8 },
    /// No slot could be freed and the message was not urgent enough to take one.
    Dropped,
}

#[derive(Clone, Debug)]
struct Slot {
    message: DisplayMessage,
    enqueued_at: u64,
    /// Insertion order, breaks ties between messages enqueued in the same millisecond.
    seq: u64,
    activated_at: u64,
}

/// Fixed-capacity priority queue of display messages.
///
/// The message on screen is tracked by slot index, never by reference into the slots.
#[derive(Debug)]
pub struct DisplayQueue<const N: usize = DEFAULT_CAPACITY> {
    slots: [Option<Slot>; N],
    active: Option<usize>,
    timing: QueueTiming,
    next_seq: u64,
    /// Set while a password is drawn with its last character readable.
    revealing: bool,
}

impl DisplayQueue {
    pub fn new(timing: QueueTiming) -> Self {
        Self::new_sized(timing)
    }
}

impl<const N: usize> DisplayQueue<N> {
    /// Creates a queue with `N` slots.
    pub fn new_sized(timing: QueueTiming) -> Self {
        DisplayQueue {
            slots: std::array::from_fn(|_| None),
            active: None,
            timing,
            next_seq: 0,
            revealing: false,
        }
    }

    pub fn timing(&self) -> &QueueTiming {
        &self.timing
    }

    /// Empties every slot. The display keeps showing what it shows.
    pub fn reset(&mut self) {
        info!("Display queue reset");
        self.slots = std::array::from_fn(|_| None);
        self.active = None;
        self.revealing = false;
    }

    /// Id of the message on screen, if any.
    pub fn active_id(&self) -> Option<u8> {
        self.active_slot().map(|slot| slot.message.id)
    }

    /// The message on screen, if any.
    pub fn active_message(&self) -> Option<&DisplayMessage> {
        self.active_slot().map(|slot| &slot.message)
    }

    /// Remaining minimum dwell of the message on screen.
    pub fn active_dwell_left(&self, now: u64) -> Option<u64> {
        self.active_slot().map(|slot| {
            slot.message
                .min_dwell_ms
                .saturating_sub(now.saturating_sub(slot.activated_at))
        })
    }

    /// State of the slot holding `id`.
    pub fn state_of(&self, id: u8) -> SlotState {
        match self.find_id(id) {
            Some(index) if self.active == Some(index) => SlotState::Active,
            Some(_) => SlotState::Waiting,
            None => SlotState::Empty,
        }
    }

    /// Ids of the waiting messages, in slot order.
    pub fn waiting_ids(&self) -> Vec<u8> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(index, _)| self.active != Some(*index))
            .filter_map(|(_, slot)| slot.as_ref().map(|s| s.message.id))
            .collect()
    }

    /// Number of occupied slots, the active one included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the message with `id`.
    ///
    /// When it is the one on screen, the display keeps its picture until something else is
    /// activated.
    pub fn complete(&mut self, id: u8) -> bool {
        let Some(index) = self.find_id(id) else {
            return false;
        };
        self.slots[index] = None;
        if self.active == Some(index) {
            info!("Active message {} completed", id);
            self.active = None;
            self.revealing = false;
        } else {
            debug!("Waiting message {} completed", id);
        }
        true
    }

    /// Adds a message at `now`.
    ///
    /// A waiting message with the same id is replaced. If the message with the same id is on
    /// screen, its payload is replaced in place and it keeps whatever dwell time it still
    /// owed, extended by the (clamped) extra time of the new message.
    pub fn enqueue(
        &mut self,
        message: DisplayMessage,
        now: u64,
        display: &mut dyn DisplayDriver,
    ) -> IoResult<EnqueueOutcome> {
        trace!("Enqueue {:?}", message);

        if let Some(index) = self.find_id(message.id) {
            if self.active == Some(index) {
                return self.overwrite_active(index, message, now, display);
            }
            debug!("Overwriting waiting message {}", message.id);
            self.slots[index] = Some(self.new_slot(message, now));
            return Ok(EnqueueOutcome::Overwritten);
        }

        if let Some(index) = self.free_slot() {
            debug!("Message {} placed in slot {}", message.id, index);
            self.slots[index] = Some(self.new_slot(message, now));
            return Ok(EnqueueOutcome::Queued);
        }

        self.evict_stale(now);
        if let Some(index) = self.free_slot() {
            debug!("Message {} placed in slot {} after eviction", message.id, index);
            self.slots[index] = Some(self.new_slot(message, now));
            return Ok(EnqueueOutcome::Queued);
        }

        if let Some(index) = self.least_urgent_waiting() {
            let victim = self.slots[index].as_ref().map(|s| (s.message.id, s.message.priority));
            if let Some((evicted_id, priority)) = victim {
                if priority > message.priority {
                    info!(
                        "Queue full, message {} (priority {}) evicted for {} (priority {})",
                        evicted_id, priority, message.id, message.priority
                    );
                    self.slots[index] = Some(self.new_slot(message, now));
                    return Ok(EnqueueOutcome::Evicted { evicted_id });
                }
            }
        }

        warn!(
            "Queue full, dropping message {} (priority {})",
            message.id, message.priority
        );
        Ok(EnqueueOutcome::Dropped)
    }

    /// Decides what the display shows at `now`.
    ///
    /// Never blanks the display: with nothing to show, the last picture stays.
    pub fn refresh(&mut self, now: u64, display: &mut dyn DisplayDriver) -> IoResult<()> {
        self.evict_stale(now);

        let Some(current) = self.active else {
            match self.best_waiting() {
                Some(next) => self.activate(next, now, display)?,
                None => trace!("Queue empty, leaving display unchanged"),
            }
            return Ok(());
        };

        if let Some(next) = self.best_waiting() {
            let (Some(active), Some(candidate)) = (&self.slots[current], &self.slots[next]) else {
                return Ok(());
            };
            let elapsed = now.saturating_sub(active.activated_at);

            if candidate.message.priority < active.message.priority {
                info!(
                    "Message {} preempts {}",
                    candidate.message.id, active.message.id
                );
                self.slots[current] = None;
                return self.activate(next, now, display);
            }

            if candidate.message.priority == active.message.priority {
                if elapsed >= active.message.min_dwell_ms {
                    info!(
                        "Message {} replaces {} after {} ms",
                        candidate.message.id, active.message.id, elapsed
                    );
                    self.slots[current] = None;
                    return self.activate(next, now, display);
                }
                trace!("Message {} waits for dwell of {}", candidate.message.id, active.message.id);
            }
        }

        if self.revealing {
            self.mask_revealed(now, display)?;
        }
        Ok(())
    }

    fn overwrite_active(
        &mut self,
        index: usize,
        message: DisplayMessage,
        now: u64,
        display: &mut dyn DisplayDriver,
    ) -> IoResult<EnqueueOutcome> {
        let Some(slot) = self.slots[index].as_mut() else {
            return Ok(EnqueueOutcome::Dropped);
        };

        let elapsed = now.saturating_sub(slot.activated_at);
        let remaining = slot.message.min_dwell_ms.saturating_sub(elapsed);
        let extra = message
            .extra_on_overwrite_ms
            .min(self.timing.max_extra_on_overwrite_ms);
        let dwell_ms = remaining + extra;

        info!(
            "Overwriting active message {}, {} ms left + {} ms extra",
            message.id, remaining, extra
        );

        let grew = match (&slot.message.payload, &message.payload) {
            (DisplayPayload::Password(old), DisplayPayload::Password(new)) => new.len() > old.len(),
            _ => true,
        };

        slot.message = DisplayMessage {
            min_dwell_ms: dwell_ms,
            ..message
        };
        slot.activated_at = now;

        self.render(index, grew, display)?;
        Ok(EnqueueOutcome::ActiveUpdated { dwell_ms })
    }

    fn activate(&mut self, index: usize, now: u64, display: &mut dyn DisplayDriver) -> IoResult<()> {
        let Some(slot) = self.slots[index].as_mut() else {
            return Ok(());
        };
        slot.activated_at = now;
        info!(
            "Activating message {} (priority {})",
            slot.message.id, slot.message.priority
        );
        self.active = Some(index);
        self.render(index, true, display)
    }

    fn render(&mut self, index: usize, reveal: bool, display: &mut dyn DisplayDriver) -> IoResult<()> {
        let Some(slot) = self.slots[index].as_ref() else {
            return Ok(());
        };

        self.revealing = false;
        match &slot.message.payload {
            DisplayPayload::Text(text) => display.draw_text(text, DEFAULT_TEXT_SIZE),
            DisplayPayload::Number(value) => display.draw_number(*value, DEFAULT_TEXT_SIZE),
            DisplayPayload::Password(input) => {
                let reveal = reveal && self.timing.password_reveal_ms > 0 && !input.is_empty();
                self.revealing = reveal;
                display.draw_password(&mask_password(input, reveal))
            }
            DisplayPayload::Lines(line1, line2) => {
                let (line1, size1) = fit_line(line1);
                let (line2, size2) = fit_line(line2);
                display.draw_lines(&line1, size1, &line2, size2)
            }
        }
    }

    /// Hides the last password character once it has been readable long enough.
    fn mask_revealed(&mut self, now: u64, display: &mut dyn DisplayDriver) -> IoResult<()> {
        let Some(slot) = self.active.and_then(|index| self.slots[index].as_ref()) else {
            self.revealing = false;
            return Ok(());
        };
        if now.saturating_sub(slot.activated_at) < self.timing.password_reveal_ms {
            return Ok(());
        }
        self.revealing = false;
        if let DisplayPayload::Password(input) = &slot.message.payload {
            trace!("Masking last password character");
            display.draw_password(&mask_password(input, false))?;
        }
        Ok(())
    }

    fn new_slot(&mut self, message: DisplayMessage, now: u64) -> Slot {
        let seq = self.next_seq;
        self.next_seq += 1;
        Slot {
            message,
            enqueued_at: now,
            seq,
            activated_at: 0,
        }
    }

    fn active_slot(&self) -> Option<&Slot> {
        self.active.and_then(|index| self.slots[index].as_ref())
    }

    fn find_id(&self, id: u8) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.message.id == id))
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.is_none())
    }

    fn waiting(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(index, _)| self.active != Some(*index))
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index, s)))
    }

    /// Most urgent waiting message, oldest first among equals.
    fn best_waiting(&self) -> Option<usize> {
        self.waiting()
            .min_by_key(|(_, s)| (s.message.priority, s.enqueued_at, s.seq))
            .map(|(index, _)| index)
    }

    /// Least urgent waiting message, newest first among equals.
    fn least_urgent_waiting(&self) -> Option<usize> {
        self.waiting()
            .max_by_key(|(_, s)| (s.message.priority, s.enqueued_at, s.seq))
            .map(|(index, _)| index)
    }

    fn evict_stale(&mut self, now: u64) {
        for index in 0..N {
            if self.active == Some(index) {
                continue;
            }
            let stale = self.slots[index]
                .as_ref()
                .is_some_and(|s| now.saturating_sub(s.enqueued_at) > self.timing.stale_after_ms);
            if stale {
                if let Some(slot) = self.slots[index].take() {
                    info!("Evicting stale message {}", slot.message.id);
                }
            }
        }
    }
}

/// Masks a password with `*`, optionally leaving its last character readable.
pub fn mask_password(input: &str, reveal_last: bool) -> String {
    let count = input.chars().count();
    let mut masked: String = "*".repeat(count.saturating_sub(reveal_last as usize));
    if reveal_last {
        if let Some(last) = input.chars().last() {
            masked.push(last);
        }
    }
    masked
}

//! Keypad and display runtime of the kiosk.
//!
//! [Hmi] ties the matrix scanner, the multi-tap decoder and the display queue together behind
//! the few calls the kiosk logic needs: read a key, read a line, probe the keypad and ask for
//! something to be shown.

pub mod codec;
pub mod config;
pub mod multitap;
pub mod queue;

use std::fmt::{Debug, Formatter};
use log::{debug, info, warn};
use kiosk_io::keypad::{KeyEvent, MatrixScanner};
use kiosk_io::{Clock, DisplayDriver, IoResult, VirtualIo};
use crate::codec::{replay, CodecError, KeyBuffer};
use crate::config::HmiConfig;
use crate::multitap::{DecodeOutput, MultiTapDecoder, MultiTapTables};
use crate::queue::{DisplayMessage, DisplayPayload, DisplayQueue, EnqueueOutcome};

/// Display id of the line being typed.
pub const LINE_ECHO_ID: u8 = 0xF0;
/// Display id of the case-toggle confirmation.
pub const CASE_TOGGLE_ID: u8 = 0xF1;

/// Longest single scan while reading a line, so the display keeps being refreshed.
const LINE_POLL_MS: u64 = 50;

/// How a line is typed and echoed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineMode {
    /// Multi-tap text, echoed as typed.
    Plain,
    /// Multi-tap text, echoed masked.
    Password,
    /// Digits only, echoed masked.
    Pin,
}

/// Result of [Hmi::read_line].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LineInput {
    /// The line confirmed with `#`.
    Line(String),
    /// Nobody touched the keypad for the whole idle timeout.
    IdleTimeout,
    /// `#` was held down.
    ServiceEscape,
}

impl LineInput {
    /// The line as a string, with `"@"` for an idle timeout and `"@service"` for the escape.
    pub fn as_sentinel(&self) -> &str {
        match self {
            LineInput::Line(line) => line.as_str(),
            LineInput::IdleTimeout => "@",
            LineInput::ServiceEscape => "@service",
        }
    }
}

/// The keypad and display of one kiosk.
pub struct Hmi<'a> {
    scanner: MatrixScanner<'a>,
    decoder: MultiTapDecoder,
    queue: DisplayQueue,
    display: &'a mut dyn DisplayDriver,
    config: HmiConfig,
}

impl Debug for Hmi<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hmi")
            .field("scanner", &self.scanner)
            .field("decoder", &self.decoder.state())
            .field("active_message", &self.queue.active_id())
            .field("display", &self.display)
            .finish()
    }
}

impl<'a> Hmi<'a> {
    pub fn new(
        io: &'a mut dyn VirtualIo,
        clock: &'a dyn Clock,
        display: &'a mut dyn DisplayDriver,
        config: HmiConfig,
    ) -> IoResult<Self> {
        let scanner = MatrixScanner::new(io, clock, config.wiring(), config.scan_timing())?;
        let decoder = MultiTapDecoder::new(MultiTapTables::default(), config.multi_tap_window_ms);
        let queue = DisplayQueue::new(config.queue_timing());
        debug!("{:?} initialized.", scanner);
        Ok(Hmi {
            scanner,
            decoder,
            queue,
            display,
            config,
        })
    }

    /// Replaces the multi-tap candidate tables.
    pub fn with_tables(mut self, tables: MultiTapTables) -> Self {
        self.decoder = MultiTapDecoder::new(tables, self.config.multi_tap_window_ms);
        self
    }

    pub fn config(&self) -> &HmiConfig {
        &self.config
    }

    pub fn decoder(&self) -> &MultiTapDecoder {
        &self.decoder
    }

    pub fn queue(&self) -> &DisplayQueue {
        &self.queue
    }

    pub fn now_ms(&self) -> u64 {
        self.scanner.clock().now_ms()
    }

    /// Waits up to `timeout_ms` for one key press, then refreshes the display.
    pub fn read_key(&mut self, timeout_ms: u64, long_press_armed: bool) -> IoResult<KeyEvent> {
        let event = self.scanner.scan(timeout_ms, long_press_armed)?;
        self.refresh()?;
        Ok(event)
    }

    /// Like [Self::read_key], but returns after a short spell of inactivity.
    pub fn read_key_fast(&mut self, timeout_ms: u64, long_press_armed: bool) -> IoResult<KeyEvent> {
        let event = self.scanner.scan_fast(timeout_ms, long_press_armed)?;
        self.refresh()?;
        Ok(event)
    }

    /// Cheap check whether any key is held right now.
    pub fn is_any_key_active(&mut self) -> IoResult<bool> {
        self.scanner.is_any_key_active()
    }

    /// Asks for `payload` to be shown and refreshes the display.
    pub fn request_display(
        &mut self,
        payload: DisplayPayload,
        id: u8,
        priority: u8,
        min_dwell_ms: u64,
        extra_on_overwrite_ms: u64,
    ) -> IoResult<EnqueueOutcome> {
        self.request(DisplayMessage {
            id,
            priority,
            min_dwell_ms,
            extra_on_overwrite_ms,
            payload,
        })
    }

    /// Queues a ready-made message and refreshes the display.
    pub fn request(&mut self, message: DisplayMessage) -> IoResult<EnqueueOutcome> {
        let now = self.now_ms();
        let outcome = self.queue.enqueue(message, now, self.display)?;
        self.queue.refresh(now, self.display)?;
        Ok(outcome)
    }

    /// Removes a message from the display queue.
    pub fn complete(&mut self, id: u8) -> bool {
        self.queue.complete(id)
    }

    /// Lets the display queue decide what is on screen now.
    pub fn refresh(&mut self) -> IoResult<()> {
        let now = self.now_ms();
        self.queue.refresh(now, self.display)
    }

    /// Reads one line of input, echoing it on the display as it is typed.
    ///
    /// `#` confirms the line, `*` deletes the last character and holding `#` escapes to the
    /// service menu. Returns [LineInput::IdleTimeout] once no key has been pressed for
    /// `idle_timeout_ms`.
    pub fn read_line(&mut self, mode: LineMode, idle_timeout_ms: u64) -> IoResult<LineInput> {
        let mut buffer = KeyBuffer::new(self.config.max_line_len);
        self.decoder.commit();
        let initial = self.decoder.state().active_table;
        let mut last_activity = self.now_ms();

        info!("Reading a line ({:?})", mode);
        self.echo(mode, "")?;

        let result = loop {
            let idle = self.now_ms().saturating_sub(last_activity);
            if idle >= idle_timeout_ms {
                info!("Line input timed out after {} ms", idle);
                break LineInput::IdleTimeout;
            }

            let event = self.scanner.scan(LINE_POLL_MS.min(idle_timeout_ms - idle), true)?;
            let now = self.now_ms();
            if event != KeyEvent::Timeout {
                last_activity = now;
            }

            let output = match mode {
                LineMode::Pin => self.decoder.feed_digit(event),
                LineMode::Plain | LineMode::Password => self.decoder.feed(event, now),
            };

            let Some(output) = output else {
                self.refresh()?;
                continue;
            };

            match output {
                DecodeOutput::Enter { long: true } => {
                    info!("Service escape requested");
                    break LineInput::ServiceEscape;
                }
                DecodeOutput::Enter { long: false } => {
                    let line = buffer.decode(self.decoder.tables(), initial);
                    info!("Line entered ({} characters)", line.chars().count());
                    break LineInput::Line(line);
                }
                DecodeOutput::Delete => {
                    if buffer.pop().is_some() {
                        let (_, table) = replay(buffer.as_slice(), self.decoder.tables(), initial);
                        self.decoder.set_active_table(table);
                    }
                }
                DecodeOutput::Char { packed, replaces_previous, .. } => {
                    let stored = if replaces_previous {
                        buffer.replace_last(packed)
                    } else {
                        buffer.push(packed)
                    };
                    if let Err(CodecError::BufferFull) = stored {
                        warn!("Line is full ({} keys), ignoring input", self.config.max_line_len);
                        self.decoder.commit();
                    }
                }
                DecodeOutput::CaseToggled { table, packed, replaces_previous } => {
                    let stored = if replaces_previous {
                        buffer.replace_last(packed)
                    } else {
                        buffer.push(packed)
                    };
                    match stored {
                        Ok(()) => {
                            self.request(
                                DisplayMessage::text(table.label())
                                    .with_id(CASE_TOGGLE_ID)
                                    .with_priority(self.config.line_priority)
                                    .with_min_dwell_ms(self.config.case_toggle_dwell_ms),
                            )?;
                        }
                        Err(_) => {
                            warn!("Line is full, case toggle dropped");
                            self.decoder.set_active_table(table.toggled());
                        }
                    }
                }
            }

            let text = buffer.decode(self.decoder.tables(), initial);
            self.echo(mode, &text)?;
        };

        self.queue.complete(LINE_ECHO_ID);
        self.queue.complete(CASE_TOGGLE_ID);
        Ok(result)
    }

    fn echo(&mut self, mode: LineMode, text: &str) -> IoResult<()> {
        let message = match mode {
            LineMode::Plain => DisplayMessage::text(text),
            LineMode::Password | LineMode::Pin => DisplayMessage::password(text),
        };
        self.request(
            message
                .with_id(LINE_ECHO_ID)
                .with_priority(self.config.line_priority)
                .with_min_dwell_ms(0),
        )?;
        Ok(())
    }
}

use kiosk_hmi::config::HmiConfig;
use kiosk_hmi::multitap::CaseTable;
use kiosk_hmi::queue::{DisplayMessage, DisplayPayload, EnqueueOutcome};
use kiosk_hmi::{Hmi, LineInput, LineMode, LINE_ECHO_ID};
use kiosk_io::keypad::{Key, KeyEvent, KeypadWiring, PressKind};
use kiosk_io::sim::{DrawCall, RecordingDisplay, SimClock, SimKeypad};
use kiosk_io::Clock;

struct Bench {
    clock: SimClock,
    keypad: SimKeypad,
    display: RecordingDisplay,
}

impl Bench {
    fn new(script: &str) -> Self {
        let clock = SimClock::new();
        let mut keypad = SimKeypad::new(clock.clone(), KeypadWiring::default());
        keypad.schedule(script, 0).unwrap();
        Bench {
            clock,
            keypad,
            display: RecordingDisplay::new(),
        }
    }

    fn hmi(&mut self, config: HmiConfig) -> Hmi<'_> {
        Hmi::new(&mut self.keypad, &self.clock, &mut self.display, config).unwrap()
    }

    fn type_line(&mut self, mode: LineMode) -> LineInput {
        self.hmi(HmiConfig::default()).read_line(mode, 10_000).unwrap()
    }

    fn passwords(&self) -> Vec<&str> {
        self.display
            .calls()
            .iter()
            .filter_map(|call| match call {
                DrawCall::Password(masked) => Some(masked.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[test]
fn multi_tap_line() {
    let mut bench = Bench::new("4 4 ~400 4 4 4 #");
    let line = bench.type_line(LineMode::Plain);
    assert_eq!(line, LineInput::Line("hi".to_string()));
    assert_eq!(line.as_sentinel(), "hi");
    assert!(bench.display.calls().contains(&DrawCall::Text("h".to_string(), 2)));
    assert!(bench.display.calls().contains(&DrawCall::Text("hi".to_string(), 2)));
}

#[test]
fn delete_drops_last_character() {
    let mut bench = Bench::new("2 2 ~400 3 * 4 #");
    assert_eq!(bench.type_line(LineMode::Plain), LineInput::Line("bg".to_string()));
}

#[test]
fn held_digit_types_the_digit() {
    let mut bench = Bench::new("7 7_ 7 #");
    assert_eq!(bench.type_line(LineMode::Plain), LineInput::Line("p7p".to_string()));
}

#[test]
fn pin_is_masked_with_brief_reveal() {
    let mut bench = Bench::new("1 2 3 4 ~300 #");
    let line = bench.type_line(LineMode::Pin);
    assert_eq!(line, LineInput::Line("1234".to_string()));

    let passwords = bench.passwords();
    assert_eq!(passwords.first(), Some(&""));
    assert!(passwords.contains(&"*2"));
    assert!(passwords.contains(&"***4"));
    assert_eq!(passwords.last(), Some(&"****"));
    assert!(bench.display.calls().iter().all(|call| !matches!(call, DrawCall::Text(..))));
}

#[test]
fn idle_timeout_returns_sentinel() {
    let mut bench = Bench::new("");
    let line = bench.hmi(HmiConfig::default()).read_line(LineMode::Password, 2000).unwrap();
    assert_eq!(line, LineInput::IdleTimeout);
    assert_eq!(line.as_sentinel(), "@");
    let now = bench.clock.now_ms();
    assert!(now >= 2000 && now < 2100, "returned at {}", now);
}

#[test]
fn typing_postpones_idle_timeout() {
    let mut bench = Bench::new("~1500 5");
    let line = bench.hmi(HmiConfig::default()).read_line(LineMode::Plain, 2000).unwrap();
    assert_eq!(line, LineInput::IdleTimeout);
    assert!(bench.clock.now_ms() >= 3500);
}

#[test]
fn held_enter_escapes_to_service() {
    let mut bench = Bench::new("1 2 #_");
    let line = bench.type_line(LineMode::Pin);
    assert_eq!(line, LineInput::ServiceEscape);
    assert_eq!(line.as_sentinel(), "@service");
}

#[test]
fn case_toggle_is_confirmed_and_not_typed() {
    let mut bench = Bench::new("0 0 0 ~700 2 #");
    let mut hmi = bench.hmi(HmiConfig::default());
    let line = hmi.read_line(LineMode::Plain, 10_000).unwrap();
    assert_eq!(line, LineInput::Line("A".to_string()));
    assert_eq!(hmi.decoder().state().active_table, CaseTable::Upper);
    drop(hmi);

    let calls = bench.display.calls();
    let confirm = calls.iter().position(|c| *c == DrawCall::Text("ABC".to_string(), 2));
    let typed = calls.iter().position(|c| *c == DrawCall::Text("A".to_string(), 2));
    assert!(confirm.is_some());
    assert!(confirm < typed);
}

#[test]
fn deleting_toggle_restores_case() {
    let mut bench = Bench::new("0 0 0 * 2 #");
    let mut hmi = bench.hmi(HmiConfig::default());
    assert_eq!(hmi.read_line(LineMode::Plain, 10_000).unwrap(), LineInput::Line("a".to_string()));
    assert_eq!(hmi.decoder().state().active_table, CaseTable::Lower);
}

#[test]
fn full_line_ignores_extra_keys() {
    let mut bench = Bench::new("2- 3- 4- 5- #");
    let config = HmiConfig {
        max_line_len: 3,
        ..HmiConfig::default()
    };
    let line = bench.hmi(config).read_line(LineMode::Plain, 10_000).unwrap();
    assert_eq!(line, LineInput::Line("adg".to_string()));
}

#[test]
fn typing_does_not_interrupt_urgent_message() {
    let mut bench = Bench::new("1 #");
    let mut hmi = bench.hmi(HmiConfig::default());
    hmi.request(DisplayMessage::text("TAMPER").with_id(1).with_priority(0).with_min_dwell_ms(60_000)).unwrap();
    assert_eq!(hmi.read_line(LineMode::Pin, 10_000).unwrap(), LineInput::Line("1".to_string()));
    assert_eq!(hmi.queue().active_id(), Some(1));
    assert_eq!(hmi.queue().state_of(LINE_ECHO_ID), kiosk_hmi::queue::SlotState::Empty);
    drop(hmi);
    assert_eq!(bench.display.calls(), &[DrawCall::Text("TAMPER".to_string(), 2)]);
}

#[test]
fn read_key_and_probe() {
    let mut bench = Bench::new("~100 5 ~200 #-");
    let mut hmi = bench.hmi(HmiConfig::default());
    assert!(!hmi.is_any_key_active().unwrap());
    assert_eq!(
        hmi.read_key(500, true).unwrap(),
        KeyEvent::Press { key: Key::Key5, kind: PressKind::Short }
    );
    assert_eq!(hmi.read_key_fast(5000, false).unwrap(), KeyEvent::Timeout);
    assert_eq!(
        hmi.read_key(1000, false).unwrap(),
        KeyEvent::Press { key: Key::KeyHash, kind: PressKind::Normal }
    );
}

#[test]
fn request_display_arbitrates() {
    let mut bench = Bench::new("");
    let mut hmi = bench.hmi(HmiConfig::default());
    let outcome = hmi.request_display(DisplayPayload::Text("Ready".into()), 1, 200, 1000, 0).unwrap();
    assert_eq!(outcome, EnqueueOutcome::Queued);
    assert_eq!(hmi.queue().active_id(), Some(1));

    hmi.request_display(DisplayPayload::Number(42), 2, 200, 1000, 0).unwrap();
    assert_eq!(hmi.queue().active_id(), Some(1));
    hmi.request_display(DisplayPayload::Text("Door open".into()), 3, 5, 1000, 0).unwrap();
    assert_eq!(hmi.queue().active_id(), Some(3));
    drop(hmi);

    assert_eq!(
        bench.display.calls(),
        &[
            DrawCall::Text("Ready".to_string(), 2),
            DrawCall::Text("Door open".to_string(), 2),
        ]
    );
}

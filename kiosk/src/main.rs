mod app;
mod config;

use std::io::Read;
use dotenv::dotenv;
use log::{debug, info, warn};
use sysinfo::System;
use time::OffsetDateTime;
use kiosk_hmi::Hmi;
use kiosk_io::sim::{RecordingDisplay, SimClock, SimKeypad};
use kiosk_io::Clock;
use crate::app::{App, AppState};
use crate::config::Config;

/// Delay between two app steps.
const UPDATE_INTERVAL_MS: u64 = 50;
/// When the first scripted key goes down.
const SCRIPT_START_MS: u64 = 100;

fn log_host_info() {
    const UNKNOWN_STR: &str = "???";

    info!(
        "Running on {} {}",
        System::name().as_deref().unwrap_or(UNKNOWN_STR),
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!(
        "Hostname {}, kernel {}, architecture {}",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::cpu_arch(),
    );
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    let env_loaded = dotenv().is_ok();
    pretty_env_logger::init();

    info!("Kiosk bench starting...");
    if !env_loaded {
        debug!("No .env file found.");
    }
    log_host_info();

    match OffsetDateTime::now_local() {
        Ok(now) => {
            let (h, m, s) = now.to_hms();
            info!("Local time {:02}:{:02}:{:02}", h, m, s);
        }
        Err(e) => warn!("Local time unavailable: {}", e),
    }

    debug!("Trying to load config...");
    let config = if let Some(config) = Config::try_load() {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved to {}.", Config::path().display());
        config
    };

    // Key presses come from stdin, e.g. `1 2 3 4 #` or `1 #_ ~200 3 3`.
    let mut script = String::new();
    std::io::stdin().read_to_string(&mut script)?;

    let clock = SimClock::new();
    let mut keypad = SimKeypad::new(clock.clone(), config.hmi.wiring());
    let script_end = keypad.schedule(&script, SCRIPT_START_MS)?;
    info!("Scripted input ends at {} ms.", script_end);

    let mut display = RecordingDisplay::new();
    let hmi = Hmi::new(&mut keypad, &clock, &mut display, config.hmi.clone())?;
    debug!("{:?} initialized.", hmi);

    info!("Starting main loop...");
    let mut app = App::new(config, hmi);
    loop {
        app.update()?;
        if clock.now_ms() > script_end && *app.state() == AppState::Idle {
            break;
        }
        clock.sleep_ms(UPDATE_INTERVAL_MS);
    }

    info!("Script finished after {} ms.", clock.now_ms());
    Ok(())
}

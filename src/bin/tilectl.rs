use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use janktile::app::adb::locator::{resolve_adb_program, validate_adb_program};
use janktile::app::config::load_config;
use janktile::app::logging::init_logging;
use janktile::app::tile::adb_services::{
    AdbKeyguardMonitor, AdbPanelHost, AdbRecordingController,
};
use janktile::app::tile::controller::{QsTile, ScreenrecordTile};
use janktile::app::tile::services::{KeyguardMonitor, PanelHost, RecordingController};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Status,
    Toggle,
    Watch,
}

#[derive(Debug, Clone)]
struct Args {
    mode: Mode,
    serial: Option<String>,
    watch_secs: u64,
    json: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut mode: Option<Mode> = None;
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut watch_secs: u64 = 30;
    let mut json = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "status" => mode = Some(Mode::Status),
            "toggle" => mode = Some(Mode::Toggle),
            "watch" => mode = Some(Mode::Watch),
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--watch-secs" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--watch-secs requires a value".to_string())?;
                watch_secs = value
                    .parse::<u64>()
                    .map_err(|_| "--watch-secs must be a positive integer".to_string())?;
            }
            "--json" => json = true,
            other => return Err(format!("Unknown argument: {other}")),
        }
    }

    let mode = mode.ok_or_else(|| "Usage: tilectl <status|toggle|watch> [--serial S] [--watch-secs N] [--json]".to_string())?;
    Ok(Args {
        mode,
        serial,
        watch_secs,
        json,
    })
}

fn print_state(tile: &ScreenrecordTile, json: bool) {
    let state = tile.compute_display_state();
    if json {
        println!(
            "{}",
            serde_json::to_string(&state).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let status = if state.value { "recording" } else { "stopped" };
        println!("{}: {} (icon: {:?})", state.label, status, state.icon);
    }
}

fn main() {
    init_logging();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("tilectl: {message}");
            std::process::exit(2);
        }
    };

    let serial = match args.serial.clone() {
        Some(serial) => serial,
        None => {
            eprintln!("tilectl: pass --serial or set ANDROID_SERIAL");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("tilectl: {err}");
            std::process::exit(2);
        }
    };

    let adb_program = resolve_adb_program(&config.adb.command_path);
    if let Err(message) = validate_adb_program(&adb_program) {
        eprintln!("tilectl: {message}");
        std::process::exit(2);
    }

    let recording = AdbRecordingController::new(
        adb_program.clone(),
        serial.clone(),
        config.screen_record.clone(),
    );
    let keyguard = AdbKeyguardMonitor::new(adb_program.clone(), serial.clone());
    let host = Arc::new(AdbPanelHost::new(adb_program, serial));

    let (mut tile, events) = ScreenrecordTile::new(
        Arc::clone(&recording) as Arc<dyn RecordingController>,
        Arc::clone(&keyguard) as Arc<dyn KeyguardMonitor>,
        host as Arc<dyn PanelHost>,
        config.tile.label.clone(),
    );

    match args.mode {
        Mode::Status => {
            print_state(&tile, args.json);
        }
        Mode::Toggle => {
            tile.on_user_activate();
            // Give the device-side process a moment to appear or exit.
            std::thread::sleep(Duration::from_millis(500));
            print_state(&tile, args.json);
        }
        Mode::Watch => {
            let poll_interval = Duration::from_millis(config.tile.poll_interval_ms);
            tile.on_listening_changed(true);
            recording.start_poller(poll_interval, &trace_id);
            keyguard.start_poller(poll_interval, &trace_id);

            print_state(&tile, args.json);
            let deadline = Instant::now() + Duration::from_secs(args.watch_secs);
            while Instant::now() < deadline {
                match events.recv_timeout(Duration::from_millis(250)) {
                    Ok(_event) => print_state(&tile, args.json),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            recording.stop_poller();
            keyguard.stop_poller();
            tile.on_listening_changed(false);
        }
    }
}

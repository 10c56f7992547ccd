use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use janktile::app::adb::device::{AdbDevice, DeviceDriver};
use janktile::app::adb::locator::{resolve_adb_program, validate_adb_program};
use janktile::app::adb::runner::run_command_with_timeout;
use janktile::app::config::load_config;
use janktile::app::jank::framestats::GfxinfoMonitor;
use janktile::app::jank::handwriting::{self, set_up};
use janktile::app::jank::harness::{JankRunner, StepContext};
use janktile::app::logging::init_logging;
use janktile::app::models::JankReport;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    out_dir: Option<PathBuf>,
    iterations: Option<u32>,
    json: bool,
}

#[derive(Serialize)]
struct RunSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    serial: String,
    adb_program: String,
    iterations: u32,
    checks: Vec<RunCheck>,
}

#[derive(Serialize)]
struct RunCheck {
    name: String,
    status: &'static str, // pass|fail
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<JankReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = std::env::var("ANDROID_SERIAL")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let mut out_dir: Option<PathBuf> = None;
    let mut iterations: Option<u32> = None;
    let mut json = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--out" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--iterations" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--iterations requires a value".to_string())?;
                iterations = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| "--iterations must be a positive integer".to_string())?,
                );
            }
            "--json" => {
                json = true;
            }
            other => {
                return Err(format!("Unknown argument: {other}"));
            }
        }
    }

    Ok(Args {
        serial,
        out_dir,
        iterations,
        json,
    })
}

fn detect_serial(adb_program: &str, trace_id: &str) -> Result<String, String> {
    let output = run_command_with_timeout(
        adb_program,
        &["devices".to_string()],
        Duration::from_secs(10),
        trace_id,
    )
    .map_err(|err| format!("adb devices failed: {err}"))?;

    let mut serials = output
        .stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect::<Vec<_>>();

    match serials.len() {
        0 => Err("No device connected; pass --serial or set ANDROID_SERIAL".to_string()),
        1 => Ok(serials.remove(0)),
        _ => Err(format!(
            "Multiple devices connected ({}); pass --serial",
            serials.join(", ")
        )),
    }
}

fn main() {
    init_logging();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("jankrun: {message}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("jankrun: {err}");
            std::process::exit(2);
        }
    };

    let adb_program = resolve_adb_program(&config.adb.command_path);
    if let Err(message) = validate_adb_program(&adb_program) {
        eprintln!("jankrun: {message}");
        std::process::exit(2);
    }

    let serial = match args.serial.clone() {
        Some(serial) => serial,
        None => match detect_serial(&adb_program, &trace_id) {
            Ok(serial) => serial,
            Err(message) => {
                eprintln!("jankrun: {message}");
                std::process::exit(2);
            }
        },
    };

    let iterations = args.iterations.unwrap_or(config.jank.iterations);
    let device: Arc<AdbDevice> = Arc::new(AdbDevice::new(
        adb_program.clone(),
        serial.clone(),
        Duration::from_secs(config.adb.command_timeout_sec),
    ));

    if let Err(err) = set_up(device.as_ref(), &config.handwriting, &trace_id) {
        eprintln!("jankrun: set-up failed: {err}");
        std::process::exit(1);
    }

    let monitor = GfxinfoMonitor::new(
        Arc::clone(&device) as Arc<dyn DeviceDriver>,
        config.handwriting.ime_package.clone(),
    );
    let runner = JankRunner::new(
        iterations,
        config.jank.jank_threshold_pct,
        Duration::from_millis(config.jank.settle_ms),
    );
    let ctx = StepContext {
        device: device.as_ref(),
        trace_id: &trace_id,
    };

    let mut checks = Vec::new();
    let mut all_passed = true;
    for test in handwriting::suite(&config.handwriting) {
        let start = Instant::now();
        let name = test.name.to_string();
        match runner.run(&test, &ctx, &monitor) {
            Ok(report) => {
                let passed = report.passed;
                all_passed &= passed;
                checks.push(RunCheck {
                    name,
                    status: if passed { "pass" } else { "fail" },
                    duration_ms: start.elapsed().as_millis(),
                    report: Some(report),
                    error: None,
                });
            }
            Err(err) => {
                all_passed = false;
                checks.push(RunCheck {
                    name,
                    status: "fail",
                    duration_ms: start.elapsed().as_millis(),
                    report: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    let summary = RunSummary {
        tool: "jankrun",
        status: if all_passed { "pass" } else { "fail" },
        trace_id: trace_id.clone(),
        serial,
        adb_program,
        iterations,
        checks,
    };

    let payload = serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string());
    if let Some(out_dir) = args.out_dir.as_ref() {
        if let Err(err) = fs::create_dir_all(out_dir) {
            eprintln!("jankrun: failed to create {}: {err}", out_dir.display());
        } else {
            let path = out_dir.join(format!("jankrun_{trace_id}.json"));
            if let Err(err) = fs::write(&path, &payload) {
                eprintln!("jankrun: failed to write {}: {err}", path.display());
            }
        }
    }

    if args.json {
        println!("{payload}");
    } else {
        println!("jankrun: {} ({} checks)", summary.status, summary.checks.len());
        for check in &summary.checks {
            let detail = match (&check.report, &check.error) {
                (Some(report), _) => format!(
                    "{} iterations, {} failed",
                    report.iterations.len(),
                    report.failures()
                ),
                (None, Some(error)) => error.clone(),
                _ => String::new(),
            };
            println!("  {:<40} {:<4} {:>6}ms  {}", check.name, check.status, check.duration_ms, detail);
        }
    }

    if !all_passed {
        std::process::exit(1);
    }
}

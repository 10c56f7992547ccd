use std::collections::HashMap;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::app::adb::runner::run_shell;
use crate::app::config::ScreenRecordSettings;
use crate::app::error::AppError;
use crate::app::tile::services::{
    CallbackId, KeyguardCallback, KeyguardMonitor, PanelHost, RecordingCallback,
    RecordingController,
};

const SHELL_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Id-keyed subscription list shared by the adb-backed services.
struct CallbackRegistry<C> {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, C>>,
}

impl<C: Clone> CallbackRegistry<C> {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    fn add(&self, callback: C) -> CallbackId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks
            .lock()
            .expect("callback registry poisoned")
            .insert(id, callback);
        CallbackId(id)
    }

    fn remove(&self, id: CallbackId) {
        self.callbacks
            .lock()
            .expect("callback registry poisoned")
            .remove(&id.0);
    }

    fn snapshot(&self) -> Vec<C> {
        self.callbacks
            .lock()
            .expect("callback registry poisoned")
            .values()
            .cloned()
            .collect()
    }
}

struct PollerHandle {
    stop_flag: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl PollerHandle {
    fn stop(self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.thread.join();
    }
}

struct RecordingSession {
    child: Child,
    remote_path: String,
}

pub fn parse_recording_active(pgrep_stdout: &str) -> bool {
    pgrep_stdout
        .lines()
        .any(|line| line.trim().parse::<u32>().is_ok())
}

pub fn parse_keyguard_showing(dumpsys: &str) -> Option<bool> {
    for line in dumpsys.lines() {
        for token in line.split_whitespace() {
            for key in ["mKeyguardShowing=", "keyguardShowing=", "mShowingLockscreen="] {
                if let Some(value) = token.strip_prefix(key) {
                    return Some(value == "true");
                }
            }
        }
    }
    None
}

pub fn screenrecord_shell_args(
    settings: &ScreenRecordSettings,
    remote_path: &str,
) -> Vec<String> {
    let mut args = vec!["screenrecord".to_string()];
    if !settings.bit_rate.trim().is_empty() {
        args.push("--bit-rate".to_string());
        args.push(settings.bit_rate.trim().to_string());
    }
    if settings.time_limit_sec > 0 {
        args.push("--time-limit".to_string());
        args.push(settings.time_limit_sec.to_string());
    }
    if !settings.size.trim().is_empty() {
        args.push("--size".to_string());
        args.push(settings.size.trim().to_string());
    }
    if settings.use_hevc {
        args.push("--codec".to_string());
        args.push("hevc".to_string());
    }
    if !settings.extra_args.trim().is_empty() {
        args.extend(settings.extra_args.split_whitespace().map(|item| item.to_string()));
    }
    args.push(remote_path.to_string());
    args
}

/// Recording controller backed by `adb shell screenrecord` on the device.
pub struct AdbRecordingController {
    adb_program: String,
    serial: String,
    settings: ScreenRecordSettings,
    session: Mutex<Option<RecordingSession>>,
    registry: CallbackRegistry<RecordingCallback>,
    last_seen: AtomicBool,
    poller: Mutex<Option<PollerHandle>>,
}

impl AdbRecordingController {
    pub fn new(
        adb_program: impl Into<String>,
        serial: impl Into<String>,
        settings: ScreenRecordSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            adb_program: adb_program.into(),
            serial: serial.into(),
            settings,
            session: Mutex::new(None),
            registry: CallbackRegistry::new(),
            last_seen: AtomicBool::new(false),
            poller: Mutex::new(None),
        })
    }

    fn query_recording(&self, trace_id: &str) -> Result<bool, AppError> {
        let output = run_shell(
            &self.adb_program,
            &self.serial,
            &["pgrep", "-x", "screenrecord"],
            SHELL_TIMEOUT,
            trace_id,
        )?;
        // pgrep exits 1 with empty output when nothing matches.
        Ok(parse_recording_active(&output.stdout))
    }

    fn start(&self, trace_id: &str) -> Result<(), AppError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| AppError::system("Recording session locked", trace_id))?;
        if guard.is_some() {
            return Err(AppError::validation("Recording already active", trace_id));
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let remote_path = format!("/sdcard/screenrecord_{}_{}.mp4", self.serial, timestamp);
        let shell_args = screenrecord_shell_args(&self.settings, &remote_path);
        let mut args = vec![
            "-s".to_string(),
            self.serial.clone(),
            "shell".to_string(),
        ];
        args.extend(shell_args);

        let child = Command::new(&self.adb_program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                AppError::dependency(format!("Failed to start screenrecord: {err}"), trace_id)
            })?;

        debug!(trace_id = %trace_id, serial = %self.serial, remote_path = %remote_path, "screenrecord started");
        *guard = Some(RecordingSession { child, remote_path });
        Ok(())
    }

    fn stop(&self, trace_id: &str) -> Result<(), AppError> {
        let session = {
            let mut guard = self
                .session
                .lock()
                .map_err(|_| AppError::system("Recording session locked", trace_id))?;
            guard.take()
        };

        // SIGINT lets screenrecord finalize the mp4 before exiting.
        let _ = run_shell(
            &self.adb_program,
            &self.serial,
            &["pkill", "-SIGINT", "screenrecord"],
            SHELL_TIMEOUT,
            trace_id,
        );

        if let Some(mut session) = session {
            let start = Instant::now();
            loop {
                match session.child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) => {
                        if start.elapsed() >= STOP_WAIT {
                            let _ = session.child.kill();
                            let _ = session.child.wait();
                            return Err(AppError::system(
                                "Timeout waiting for screenrecord to stop",
                                trace_id,
                            ));
                        }
                        thread::sleep(Duration::from_millis(100));
                    }
                    Err(err) => {
                        return Err(AppError::system(
                            format!("Failed to stop screenrecord: {err}"),
                            trace_id,
                        ));
                    }
                }
            }
            debug!(trace_id = %trace_id, serial = %self.serial, remote_path = %session.remote_path, "screenrecord stopped");
        }
        Ok(())
    }

    fn notify(&self, value: bool) {
        for callback in self.registry.snapshot() {
            callback(value);
        }
    }

    /// Watches the device-side screenrecord process and fans state changes
    /// out to the subscription list.
    pub fn start_poller(self: &Arc<Self>, interval: Duration, trace_id: &str) {
        let mut guard = self.poller.lock().expect("poller lock poisoned");
        if guard.is_some() {
            return;
        }
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_flag);
        let controller = Arc::clone(self);
        let trace_id = trace_id.to_string();
        let thread = thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match controller.query_recording(&trace_id) {
                    Ok(value) => {
                        let previous = controller.last_seen.swap(value, Ordering::SeqCst);
                        if previous != value {
                            controller.notify(value);
                        }
                    }
                    Err(err) => {
                        warn!(trace_id = %trace_id, serial = %controller.serial, error = %err, "recording poll failed");
                    }
                }
                thread::sleep(interval);
            }
        });
        *guard = Some(PollerHandle { stop_flag, thread });
    }

    pub fn stop_poller(&self) {
        let handle = self.poller.lock().expect("poller lock poisoned").take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }
}

impl RecordingController for AdbRecordingController {
    fn is_recording(&self) -> bool {
        match self.query_recording("recording-query") {
            Ok(value) => {
                self.last_seen.store(value, Ordering::SeqCst);
                value
            }
            Err(err) => {
                warn!(serial = %self.serial, error = %err, "recording query failed; using last known state");
                self.last_seen.load(Ordering::SeqCst)
            }
        }
    }

    fn auto_record(&self) {
        let trace_id = format!("auto-record-{}", Utc::now().format("%H%M%S%3f"));
        let result = if self.is_recording() {
            self.stop(&trace_id)
        } else {
            self.start(&trace_id)
        };
        if let Err(err) = result {
            // Fire-and-forget from the tile's perspective; the failure stays here.
            warn!(trace_id = %trace_id, serial = %self.serial, error = %err, "auto record failed");
        }
    }

    fn add_callback(&self, callback: RecordingCallback) -> CallbackId {
        self.registry.add(callback)
    }

    fn remove_callback(&self, id: CallbackId) {
        self.registry.remove(id);
    }
}

impl Drop for AdbRecordingController {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

/// Keyguard monitor polling `dumpsys window policy` on the device.
pub struct AdbKeyguardMonitor {
    adb_program: String,
    serial: String,
    registry: CallbackRegistry<KeyguardCallback>,
    last_seen: AtomicBool,
    poller: Mutex<Option<PollerHandle>>,
}

impl AdbKeyguardMonitor {
    pub fn new(adb_program: impl Into<String>, serial: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            adb_program: adb_program.into(),
            serial: serial.into(),
            registry: CallbackRegistry::new(),
            last_seen: AtomicBool::new(false),
            poller: Mutex::new(None),
        })
    }

    fn query_showing(&self, trace_id: &str) -> Result<Option<bool>, AppError> {
        let output = run_shell(
            &self.adb_program,
            &self.serial,
            &["dumpsys", "window", "policy"],
            SHELL_TIMEOUT,
            trace_id,
        )?;
        Ok(parse_keyguard_showing(&output.stdout))
    }

    pub fn start_poller(self: &Arc<Self>, interval: Duration, trace_id: &str) {
        let mut guard = self.poller.lock().expect("poller lock poisoned");
        if guard.is_some() {
            return;
        }
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_flag);
        let monitor = Arc::clone(self);
        let trace_id = trace_id.to_string();
        let thread = thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match monitor.query_showing(&trace_id) {
                    Ok(Some(showing)) => {
                        let previous = monitor.last_seen.swap(showing, Ordering::SeqCst);
                        if previous != showing {
                            for callback in monitor.registry.snapshot() {
                                callback();
                            }
                        }
                    }
                    Ok(None) => {
                        warn!(trace_id = %trace_id, serial = %monitor.serial, "keyguard flag missing from dumpsys");
                    }
                    Err(err) => {
                        warn!(trace_id = %trace_id, serial = %monitor.serial, error = %err, "keyguard poll failed");
                    }
                }
                thread::sleep(interval);
            }
        });
        *guard = Some(PollerHandle { stop_flag, thread });
    }

    pub fn stop_poller(&self) {
        let handle = self.poller.lock().expect("poller lock poisoned").take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }
}

impl KeyguardMonitor for AdbKeyguardMonitor {
    fn is_showing(&self) -> bool {
        match self.query_showing("keyguard-query") {
            Ok(Some(showing)) => {
                self.last_seen.store(showing, Ordering::SeqCst);
                showing
            }
            Ok(None) | Err(_) => self.last_seen.load(Ordering::SeqCst),
        }
    }

    fn add_callback(&self, callback: KeyguardCallback) -> CallbackId {
        self.registry.add(callback)
    }

    fn remove_callback(&self, id: CallbackId) {
        self.registry.remove(id);
    }
}

impl Drop for AdbKeyguardMonitor {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

/// Panel host that collapses the shade with `cmd statusbar collapse`.
pub struct AdbPanelHost {
    adb_program: String,
    serial: String,
}

impl AdbPanelHost {
    pub fn new(adb_program: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            adb_program: adb_program.into(),
            serial: serial.into(),
        }
    }
}

impl PanelHost for AdbPanelHost {
    fn collapse_panels(&self) {
        let result = run_shell(
            &self.adb_program,
            &self.serial,
            &["cmd", "statusbar", "collapse"],
            SHELL_TIMEOUT,
            "panel-collapse",
        );
        if let Err(err) = result {
            warn!(serial = %self.serial, error = %err, "panel collapse failed");
        }
    }
}

use std::time::Duration;

use tracing::debug;

use crate::app::adb::runner::{run_shell, CommandOutput};
use crate::app::error::AppError;

/// Narrow automation surface over one connected device. Every call blocks
/// until the platform confirms the action or the adb invocation fails.
pub trait DeviceDriver: Send + Sync {
    fn serial(&self) -> &str;
    fn wake_up(&self, trace_id: &str) -> Result<(), AppError>;
    fn press_back(&self, trace_id: &str) -> Result<(), AppError>;
    fn press_home(&self, trace_id: &str) -> Result<(), AppError>;
    fn tap(&self, x: i32, y: i32, trace_id: &str) -> Result<(), AppError>;
    fn launch_activity(&self, component: &str, trace_id: &str) -> Result<(), AppError>;
    fn select_ime(&self, component: &str, trace_id: &str) -> Result<(), AppError>;
    fn dumpsys(&self, service_args: &[&str], trace_id: &str) -> Result<String, AppError>;
}

pub struct AdbDevice {
    adb_program: String,
    serial: String,
    timeout: Duration,
}

impl AdbDevice {
    pub fn new(adb_program: impl Into<String>, serial: impl Into<String>, timeout: Duration) -> Self {
        Self {
            adb_program: adb_program.into(),
            serial: serial.into(),
            timeout,
        }
    }

    fn shell(&self, shell_args: &[&str], trace_id: &str) -> Result<CommandOutput, AppError> {
        debug!(trace_id = %trace_id, serial = %self.serial, args = ?shell_args, "adb shell");
        let output = run_shell(
            &self.adb_program,
            &self.serial,
            shell_args,
            self.timeout,
            trace_id,
        )?;
        if !output.succeeded() {
            return Err(AppError::device(
                format!(
                    "adb shell {} failed (exit {:?}): {}",
                    shell_args.join(" "),
                    output.exit_code,
                    output.stderr.trim()
                ),
                trace_id,
            ));
        }
        Ok(output)
    }
}

pub fn keyevent_args(keycode: &str) -> Vec<&str> {
    vec!["input", "keyevent", keycode]
}

pub fn tap_args(x: i32, y: i32) -> Vec<String> {
    vec![
        "input".to_string(),
        "tap".to_string(),
        x.to_string(),
        y.to_string(),
    ]
}

pub fn launch_activity_args(component: &str) -> Vec<&str> {
    vec!["am", "start", "-W", "-n", component]
}

impl DeviceDriver for AdbDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn wake_up(&self, trace_id: &str) -> Result<(), AppError> {
        self.shell(&keyevent_args("KEYCODE_WAKEUP"), trace_id)?;
        Ok(())
    }

    fn press_back(&self, trace_id: &str) -> Result<(), AppError> {
        self.shell(&keyevent_args("KEYCODE_BACK"), trace_id)?;
        Ok(())
    }

    fn press_home(&self, trace_id: &str) -> Result<(), AppError> {
        self.shell(&keyevent_args("KEYCODE_HOME"), trace_id)?;
        Ok(())
    }

    fn tap(&self, x: i32, y: i32, trace_id: &str) -> Result<(), AppError> {
        let args = tap_args(x, y);
        let borrowed: Vec<&str> = args.iter().map(String::as_str).collect();
        self.shell(&borrowed, trace_id)?;
        Ok(())
    }

    fn launch_activity(&self, component: &str, trace_id: &str) -> Result<(), AppError> {
        let output = self.shell(&launch_activity_args(component), trace_id)?;
        // `am start` reports resolution errors on stdout with exit code 0.
        if output.stdout.contains("Error:") {
            return Err(AppError::device(
                format!("Failed to launch {component}: {}", output.stdout.trim()),
                trace_id,
            ));
        }
        Ok(())
    }

    fn select_ime(&self, component: &str, trace_id: &str) -> Result<(), AppError> {
        self.shell(&["ime", "enable", component], trace_id)?;
        self.shell(&["ime", "set", component], trace_id)?;
        Ok(())
    }

    fn dumpsys(&self, service_args: &[&str], trace_id: &str) -> Result<String, AppError> {
        let mut args = vec!["dumpsys"];
        args.extend_from_slice(service_args);
        Ok(self.shell(&args, trace_id)?.stdout)
    }
}

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::adb::monkey::build_monkey_args;
use crate::app::adb::parse::{parse_device_serials, parse_ps_pids, LOGCAT_PROCESS, MONKEY_PROCESS};
use crate::app::adb::runner::{
    run_adb, run_command, run_command_with_timeout, spawn_to_file, CommandOutput,
};
use crate::app::config::{LogcatSettings, MonkeySettings};
use crate::app::error::AppError;
use crate::app::state::{LogcatHandle, LogcatRegistry};

/// Operations the run coordinator needs from the device bridge.
pub trait DeviceBridge: Send + Sync {
    /// Serials of connected devices in the `device` state.
    fn detect_devices(&self, trace_id: &str) -> Result<Vec<String>, AppError>;

    /// Runs one monkey session to completion and returns its exit code.
    fn monkey_run(&self, device: &str, app_id: &str, trace_id: &str) -> Result<Option<i32>, AppError>;

    /// Force-stops `app_id` on `device`.
    fn monkey_stop(&self, device: &str, app_id: &str, trace_id: &str) -> Result<bool, AppError>;

    /// Kills every monkey process on `device`; returns how many were found.
    fn kill_monkeys(&self, device: &str, trace_id: &str) -> Result<usize, AppError>;

    /// Clears the device log and starts capturing it into `log_path`.
    fn start_logging(&self, device: &str, log_path: &Path, trace_id: &str) -> Result<(), AppError>;

    /// Stops the capture started by `start_logging`, on the device and on the host.
    fn end_logging(&self, device: &str, trace_id: &str) -> Result<(), AppError>;
}

/// `DeviceBridge` backed by the `adb` executable.
pub struct AdbBridge {
    program: String,
    monkey: MonkeySettings,
    logcat: LogcatSettings,
    logcat_processes: LogcatRegistry,
}

impl AdbBridge {
    pub fn new(program: impl Into<String>, monkey: MonkeySettings, logcat: LogcatSettings) -> Self {
        Self {
            program: program.into(),
            monkey,
            logcat,
            logcat_processes: LogcatRegistry::new(),
        }
    }

    /// Output of `adb version`, bounded to a few seconds.
    pub fn version(&self, trace_id: &str) -> Result<String, AppError> {
        let args = vec!["version".to_string()];
        let output = run_command_with_timeout(&self.program, &args, Duration::from_secs(5), trace_id)?;
        if !output.success() {
            return Err(AppError::dependency(
                format!("adb version failed: {}", output.stderr.trim()),
                trace_id,
            ));
        }
        Ok(output.stdout.trim().to_string())
    }

    fn shell(&self, device: &str, command: &[&str], trace_id: &str) -> Result<CommandOutput, AppError> {
        let mut args = vec!["-s".to_string(), device.to_string(), "shell".to_string()];
        args.extend(command.iter().map(|part| part.to_string()));
        run_adb(&self.program, &args, trace_id)
    }

    /// `ps -A` lists every process on Android 8+; older builds reject the flag.
    fn device_processes(&self, device: &str, trace_id: &str) -> Result<String, AppError> {
        let output = self.shell(device, &["ps", "-A"], trace_id)?;
        if output.success() && output.stdout.lines().count() > 1 {
            return Ok(output.stdout);
        }
        let output = self.shell(device, &["ps"], trace_id)?;
        if !output.success() {
            return Err(AppError::dependency(
                format!("ps failed on {device}: {}", output.stderr.trim()),
                trace_id,
            ));
        }
        Ok(output.stdout)
    }

    fn kill_device_processes(&self, device: &str, name: &str, trace_id: &str) -> Result<usize, AppError> {
        let listing = self.device_processes(device, trace_id)?;
        let pids = parse_ps_pids(&listing, name);
        for pid in &pids {
            let pid = pid.to_string();
            let output = self.shell(device, &["kill", pid.as_str()], trace_id)?;
            if !output.success() {
                warn!(
                    trace_id = %trace_id,
                    device = %device,
                    pid = %pid,
                    process = name,
                    stderr = %output.stderr.trim(),
                    "kill failed"
                );
            }
        }
        Ok(pids.len())
    }
}

impl DeviceBridge for AdbBridge {
    fn detect_devices(&self, trace_id: &str) -> Result<Vec<String>, AppError> {
        let args = vec!["devices".to_string()];
        let output = run_adb(&self.program, &args, trace_id)?;
        if !output.success() {
            return Err(AppError::dependency(
                format!("adb devices failed: {}", output.stderr.trim()),
                trace_id,
            ));
        }
        Ok(parse_device_serials(&output.stdout))
    }

    fn monkey_run(&self, device: &str, app_id: &str, trace_id: &str) -> Result<Option<i32>, AppError> {
        let args = build_monkey_args(device, app_id, &self.monkey);
        debug!(trace_id = %trace_id, device = %device, args = %args.join(" "), "monkey run");
        let output = run_command(&self.program, &args, None, trace_id)?;
        Ok(output.exit_code)
    }

    fn monkey_stop(&self, device: &str, app_id: &str, trace_id: &str) -> Result<bool, AppError> {
        let output = self.shell(device, &["am", "force-stop", app_id], trace_id)?;
        Ok(output.success())
    }

    fn kill_monkeys(&self, device: &str, trace_id: &str) -> Result<usize, AppError> {
        self.kill_device_processes(device, MONKEY_PROCESS, trace_id)
    }

    fn start_logging(&self, device: &str, log_path: &Path, trace_id: &str) -> Result<(), AppError> {
        let timeout = Duration::from_secs(self.logcat.setup_timeout_secs);
        let clear = vec![
            "-s".to_string(),
            device.to_string(),
            "logcat".to_string(),
            "-c".to_string(),
        ];
        let output = run_command_with_timeout(&self.program, &clear, timeout, trace_id)?;
        if !output.success() {
            return Err(AppError::dependency(
                format!("logcat -c failed on {device}: {}", output.stderr.trim()),
                trace_id,
            ));
        }

        let mut capture = vec!["-s".to_string(), device.to_string(), "logcat".to_string()];
        capture.extend(self.logcat.filter.split_whitespace().map(str::to_string));
        self.logcat_processes.start(device, trace_id, || {
            let child = spawn_to_file(&self.program, &capture, log_path, trace_id)?;
            Ok(LogcatHandle { child })
        })?;
        info!(
            trace_id = %trace_id,
            device = %device,
            log = %log_path.display(),
            "logcat capture started"
        );
        Ok(())
    }

    fn end_logging(&self, device: &str, trace_id: &str) -> Result<(), AppError> {
        info!(trace_id = %trace_id, device = %device, "killing logcat on device");
        let device_result = self.kill_device_processes(device, LOGCAT_PROCESS, trace_id);

        info!(trace_id = %trace_id, device = %device, "killing logcat on host");
        self.logcat_processes.stop(device, trace_id)?;
        device_result.map(|_| ())
    }
}

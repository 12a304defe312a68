use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::bridge::DeviceBridge;
use crate::app::config::DEFAULT_LOG_DIR_PREFIX;
use crate::app::error::AppError;
use crate::app::models::{DeviceReport, IterationReport, RunSummary};
use crate::app::paths::{
    archive_and_truncate, archive_log_path, current_log_path, prepare_log_dir,
    timestamped_log_dir,
};

#[cfg(test)]
mod tests;

pub const NO_READY_DEVICES: &str = "It doesn't seem like there are ready, connected devices.";

/// Drives monkey runs on a set of devices, one worker thread per device.
pub struct MonkeyCommander {
    app_id: Option<String>,
    iterations: u32,
    device_list: Option<Vec<String>>,
    log_dir: PathBuf,
    bridge: Arc<dyn DeviceBridge>,
    cancel_flag: Arc<AtomicBool>,
    trace_id: String,
}

struct DeviceJob {
    device: String,
    app_id: String,
    iterations: u32,
    log_dir: PathBuf,
    trace_id: String,
}

impl MonkeyCommander {
    /// Logs go to a fresh `monkey_logs<timestamp>` directory in the working directory unless
    /// `with_log_dir` says otherwise.
    pub fn new(app_id: Option<String>, bridge: Arc<dyn DeviceBridge>) -> Self {
        Self {
            app_id,
            iterations: 1,
            device_list: None,
            log_dir: timestamped_log_dir(Path::new(""), DEFAULT_LOG_DIR_PREFIX),
            bridge,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        let trace_id = trace_id.into();
        if !trace_id.trim().is_empty() {
            self.trace_id = trace_id;
        }
        self
    }

    pub fn set_app_id(&mut self, app_id: Option<String>) {
        self.app_id = app_id;
    }

    pub fn set_iterations(&mut self, iterations: u32) {
        self.iterations = iterations;
    }

    pub fn set_device_list(&mut self, devices: Vec<String>) {
        self.device_list = Some(dedup_devices(devices));
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn device_list(&self) -> Option<&[String]> {
        self.device_list.as_deref()
    }

    /// Setting the returned flag stops every worker before its next iteration. It stays set
    /// until the caller clears it.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    /// Uses the comma separated `devices` when given, otherwise asks the bridge for
    /// connected devices.
    pub fn detect_devices(&mut self, devices: Option<&str>) -> Result<Vec<String>, AppError> {
        let list = match devices {
            Some(devices) => devices
                .split(',')
                .map(str::trim)
                .filter(|device| !device.is_empty())
                .map(str::to_string)
                .collect(),
            None => self.bridge.detect_devices(&self.trace_id)?,
        };
        let list = dedup_devices(list);
        self.device_list = Some(list.clone());
        Ok(list)
    }

    /// Kills the monkey on each device. Failures are logged, never raised.
    pub fn kill_monkeys(&self) {
        let Some(devices) = self.device_list.as_deref() else {
            warn!(trace_id = %self.trace_id, "no devices specified yet");
            return;
        };
        for device in devices {
            info!(trace_id = %self.trace_id, device = %device, "killing the monkey");
            match self.bridge.kill_monkeys(device, &self.trace_id) {
                Ok(count) => {
                    if count > 0 {
                        info!(trace_id = %self.trace_id, device = %device, killed = count, "monkeys killed");
                    }
                }
                Err(err) => {
                    warn!(trace_id = %self.trace_id, device = %device, error = %err, "failed to kill monkeys");
                }
            }
        }
    }

    /// Stops log capture on each device. Failures are logged, never raised.
    pub fn end_logging(&self) {
        let Some(devices) = self.device_list.as_deref() else {
            return;
        };
        for device in devices {
            if let Err(err) = self.bridge.end_logging(device, &self.trace_id) {
                warn!(trace_id = %self.trace_id, device = %device, error = %err, "failed to end logging");
            }
        }
    }

    /// Runs the configured number of monkey iterations on every device in parallel, then
    /// cleans up stray monkeys and log captures.
    pub fn command_monkeys(&self) -> Result<RunSummary, AppError> {
        let devices = match self.device_list.as_deref() {
            Some(devices) if !devices.is_empty() => devices.to_vec(),
            _ => {
                return Err(AppError::validation(
                    "No devices found or specified.",
                    &self.trace_id,
                ))
            }
        };
        let app_id = self
            .app_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::validation("No app id specified.", &self.trace_id))?
            .to_string();

        self.prepare()?;

        // Raised by a failing worker; scoped to this run so the commander can be reused.
        let run_failed = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(devices.len());
        for device in &devices {
            let job = DeviceJob {
                device: device.clone(),
                app_id: app_id.clone(),
                iterations: self.iterations,
                log_dir: self.log_dir.clone(),
                trace_id: self.trace_id.clone(),
            };
            let bridge = Arc::clone(&self.bridge);
            let stop = StopSignal {
                cancel_flag: Arc::clone(&self.cancel_flag),
                run_failed: Arc::clone(&run_failed),
            };
            let handle = std::thread::spawn(move || command_device(bridge.as_ref(), &job, &stop));
            workers.push((device.clone(), handle));
        }

        let mut reports = Vec::with_capacity(workers.len());
        let mut first_error: Option<AppError> = None;
        for (device, handle) in workers {
            let (report, error) = match handle.join() {
                Ok(outcome) => outcome,
                Err(_) => {
                    let mut report = DeviceReport::new(&device);
                    report.error = Some("worker panicked".to_string());
                    let err = AppError::system(format!("Worker for {device} panicked"), &self.trace_id);
                    (report, Some(err))
                }
            };
            if first_error.is_none() {
                first_error = error;
            }
            reports.push(report);
        }

        self.kill_monkeys();
        self.end_logging();

        if let Some(err) = first_error {
            return Err(err);
        }

        let summary = RunSummary {
            trace_id: self.trace_id.clone(),
            app_id,
            log_dir: self.log_dir.display().to_string(),
            iterations: self.iterations,
            devices: reports,
        };
        info!(
            trace_id = %self.trace_id,
            devices = summary.devices.len(),
            monkey_errors = summary.monkey_errors(),
            "all masters finished"
        );
        Ok(summary)
    }

    fn prepare(&self) -> Result<(), AppError> {
        if prepare_log_dir(&self.log_dir, &self.trace_id)? {
            info!(trace_id = %self.trace_id, log_dir = %self.log_dir.display(), "writing to log folder");
        }
        self.kill_monkeys();
        Ok(())
    }
}

struct StopSignal {
    cancel_flag: Arc<AtomicBool>,
    run_failed: Arc<AtomicBool>,
}

impl StopSignal {
    fn should_stop(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed) || self.run_failed.load(Ordering::Relaxed)
    }
}

/// Drops repeated serials, keeping first-seen order.
fn dedup_devices(devices: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|device| seen.insert(device.clone()))
        .collect()
}

fn command_device(
    bridge: &dyn DeviceBridge,
    job: &DeviceJob,
    stop: &StopSignal,
) -> (DeviceReport, Option<AppError>) {
    let mut report = DeviceReport::new(&job.device);
    let trace_id = job.trace_id.as_str();
    let device = job.device.as_str();

    let fail = |mut report: DeviceReport, err: AppError| {
        stop.run_failed.store(true, Ordering::Relaxed);
        report.error = Some(err.error.clone());
        (report, Some(err))
    };

    let current_log = current_log_path(&job.log_dir, device);
    info!(trace_id = %trace_id, device = %device, log = %current_log.display(), "creating log file");
    if let Err(err) = bridge.start_logging(device, &current_log, trace_id) {
        warn!(trace_id = %trace_id, device = %device, error = %err, "log setup failed");
        return fail(report, AppError::dependency(NO_READY_DEVICES, trace_id));
    }

    info!(trace_id = %trace_id, device = %device, "starting to command monkeys");
    for index in 0..job.iterations {
        if stop.should_stop() {
            info!(trace_id = %trace_id, device = %device, iteration = index, "run cancelled");
            report.cancelled = true;
            break;
        }
        info!(trace_id = %trace_id, device = %device, iteration = index, "monkey is doing its thing");

        let exit_code = match bridge.monkey_run(device, &job.app_id, trace_id) {
            Ok(exit_code) => exit_code,
            Err(err) => return fail(report, err),
        };
        let monkey_error = exit_code != Some(0);
        if monkey_error {
            warn!(trace_id = %trace_id, device = %device, iteration = index, exit_code = ?exit_code, "monkey encountered an error");
        }

        let archive = archive_log_path(&job.log_dir, device, index);
        if let Err(err) = archive_and_truncate(&current_log, &archive, trace_id) {
            return fail(report, err);
        }

        info!(trace_id = %trace_id, device = %device, iteration = index, "killing the app before the next monkey");
        match bridge.monkey_stop(device, &job.app_id, trace_id) {
            Ok(true) => {}
            Ok(false) => warn!(trace_id = %trace_id, device = %device, "force-stop reported failure"),
            Err(err) => warn!(trace_id = %trace_id, device = %device, error = %err, "force-stop failed"),
        }

        report.iterations.push(IterationReport {
            index,
            exit_code,
            monkey_error,
            archived_log: archive.display().to_string(),
        });
    }

    report.completed = !report.cancelled;
    info!(trace_id = %trace_id, device = %device, "all monkeys are done");
    (report, None)
}

use super::*;

use std::fs;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Records every bridge call and writes a line into the current log on each monkey run.
#[derive(Default)]
struct FakeBridge {
    calls: Mutex<Vec<String>>,
    detected: Vec<String>,
    monkey_exit: Option<i32>,
    fail_logging_for: Option<String>,
    fail_kill: bool,
    logs: Mutex<std::collections::HashMap<String, PathBuf>>,
    cancel_after_first_run: Option<Arc<AtomicBool>>,
    fail_run_for: Option<String>,
    run_failure_seen: AtomicBool,
}

impl FakeBridge {
    fn new() -> Self {
        Self {
            detected: vec!["42".to_string(), "43".to_string()],
            monkey_exit: Some(0),
            ..Self::default()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls").push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|call| call.starts_with(prefix)).count()
    }

    /// Holds a healthy device's monkey until the failing device has errored out.
    fn wait_for_run_failure(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.run_failure_seen.load(Ordering::Relaxed) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(100));
    }
}

impl DeviceBridge for FakeBridge {
    fn detect_devices(&self, _trace_id: &str) -> Result<Vec<String>, AppError> {
        self.record("detect".to_string());
        Ok(self.detected.clone())
    }

    fn monkey_run(&self, device: &str, app_id: &str, trace_id: &str) -> Result<Option<i32>, AppError> {
        self.record(format!("run {device} {app_id}"));
        match self.fail_run_for.as_deref() {
            Some(failing) if failing == device => {
                self.run_failure_seen.store(true, Ordering::Relaxed);
                return Err(AppError::dependency("adb connection reset", trace_id));
            }
            Some(_) => self.wait_for_run_failure(),
            None => {}
        }
        if let Some(path) = self.logs.lock().expect("logs").get(device) {
            let mut content = fs::read_to_string(path).unwrap_or_default();
            content.push_str(&format!("W/Monkey({device}): event\n"));
            fs::write(path, content).expect("write log");
        }
        if let Some(flag) = &self.cancel_after_first_run {
            flag.store(true, Ordering::Relaxed);
        }
        Ok(self.monkey_exit)
    }

    fn monkey_stop(&self, device: &str, app_id: &str, _trace_id: &str) -> Result<bool, AppError> {
        self.record(format!("stop {device} {app_id}"));
        Ok(true)
    }

    fn kill_monkeys(&self, device: &str, trace_id: &str) -> Result<usize, AppError> {
        self.record(format!("kill {device}"));
        if self.fail_kill {
            return Err(AppError::dependency("device offline", trace_id));
        }
        Ok(0)
    }

    fn start_logging(&self, device: &str, log_path: &Path, trace_id: &str) -> Result<(), AppError> {
        self.record(format!("log-start {device}"));
        if self.fail_logging_for.as_deref() == Some(device) {
            return Err(AppError::timeout("logcat -c timed out", trace_id));
        }
        fs::write(log_path, "").expect("create log");
        self.logs
            .lock()
            .expect("logs")
            .insert(device.to_string(), log_path.to_path_buf());
        Ok(())
    }

    fn end_logging(&self, device: &str, _trace_id: &str) -> Result<(), AppError> {
        self.record(format!("log-end {device}"));
        Ok(())
    }
}

fn commander(bridge: Arc<FakeBridge>, log_dir: &Path) -> MonkeyCommander {
    MonkeyCommander::new(Some("com.test.Example".to_string()), bridge)
        .with_log_dir(log_dir)
        .with_trace_id("trace-test")
}

#[test]
fn kill_with_devices_does_not_fail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let mut commander = commander(Arc::clone(&bridge), dir.path());
    commander.set_device_list(vec!["80123".to_string(), "34555".to_string()]);

    commander.kill_monkeys();

    assert_eq!(bridge.calls(), vec!["kill 80123", "kill 34555"]);
}

#[test]
fn kill_without_devices_only_warns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let commander = commander(Arc::clone(&bridge), dir.path());

    commander.kill_monkeys();

    assert!(bridge.calls().is_empty());
}

#[test]
fn kill_failures_are_swallowed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge {
        fail_kill: true,
        ..FakeBridge::new()
    });
    let mut commander = commander(Arc::clone(&bridge), dir.path());
    commander.set_device_list(vec!["80123".to_string()]);

    commander.kill_monkeys();

    assert_eq!(bridge.count("kill"), 1);
}

#[test]
fn detect_devices_splits_explicit_list() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let mut commander = commander(Arc::clone(&bridge), dir.path());

    let devices = commander.detect_devices(Some(" 80123, ,34555,")).expect("detect");

    assert_eq!(devices, vec!["80123", "34555"]);
    assert_eq!(commander.device_list(), Some(devices.as_slice()));
    assert!(bridge.calls().is_empty());
}

#[test]
fn detect_devices_asks_the_bridge_when_no_list_given() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let mut commander = commander(Arc::clone(&bridge), dir.path());

    let devices = commander.detect_devices(None).expect("detect");

    assert_eq!(devices, vec!["42", "43"]);
    assert_eq!(bridge.calls(), vec!["detect"]);
}

#[test]
fn command_without_devices_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let commander = commander(Arc::clone(&bridge), dir.path());

    let err = commander.command_monkeys().expect_err("expected error");

    assert_eq!(err.code, "ERR_VALIDATION");
    assert_eq!(err.error, "No devices found or specified.");
    assert_eq!(err.trace_id, "trace-test");
    assert!(bridge.calls().is_empty());
}

#[test]
fn command_with_empty_device_list_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let mut commander = commander(Arc::clone(&bridge), dir.path());
    commander.set_device_list(Vec::new());

    let err = commander.command_monkeys().expect_err("expected error");
    assert!(err.is_validation());
}

#[test]
fn command_without_app_id_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let mut commander = MonkeyCommander::new(None, bridge.clone()).with_log_dir(dir.path());
    commander.set_device_list(vec!["80123".to_string(), "34555".to_string()]);

    let err = commander.command_monkeys().expect_err("expected error");

    assert_eq!(err.code, "ERR_VALIDATION");
    assert_eq!(err.error, "No app id specified.");
    assert!(bridge.calls().is_empty());
}

#[test]
fn unready_device_aborts_the_run_and_cleans_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge {
        fail_logging_for: Some("34555".to_string()),
        ..FakeBridge::new()
    });
    let mut commander = commander(Arc::clone(&bridge), &dir.path().join("logs"));
    commander.set_device_list(vec!["80123".to_string(), "34555".to_string()]);
    commander.set_iterations(3);

    let err = commander.command_monkeys().expect_err("expected error");

    assert_eq!(err.code, "ERR_DEPENDENCY");
    assert_eq!(err.error, NO_READY_DEVICES);
    assert!(!commander.cancel_handle().load(Ordering::Relaxed));
    assert_eq!(bridge.count("log-end"), 2);
    // once during prepare, once during cleanup
    assert_eq!(bridge.count("kill 80123"), 2);
    assert_eq!(bridge.count("run 34555"), 0);
}

#[test]
fn runs_every_iteration_on_every_device() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_dir = dir.path().join("monkey_logs20240101_120000");
    let bridge = Arc::new(FakeBridge::new());
    let mut commander = commander(Arc::clone(&bridge), &log_dir);
    commander.set_device_list(vec!["42".to_string(), "43".to_string()]);
    commander.set_iterations(2);

    let summary = commander.command_monkeys().expect("run");

    assert_eq!(summary.app_id, "com.test.Example");
    assert_eq!(summary.trace_id, "trace-test");
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.devices.len(), 2);
    assert_eq!(summary.monkey_errors(), 0);
    for report in &summary.devices {
        assert!(report.completed);
        assert!(!report.cancelled);
        assert_eq!(report.iterations.len(), 2);
    }

    assert_eq!(bridge.count("run "), 4);
    assert_eq!(bridge.count("stop "), 4);
    assert_eq!(bridge.count("log-start "), 2);
    assert_eq!(bridge.count("log-end "), 2);

    for device in ["42", "43"] {
        for index in 0..2 {
            let archive = log_dir.join(format!("monkeylog_{device}_{index}.txt"));
            assert_eq!(
                fs::read_to_string(&archive).expect("archive"),
                format!("W/Monkey({device}): event\n"),
                "each archive holds only its own iteration"
            );
        }
        let current = log_dir.join(format!("monkey_current{device}.txt"));
        assert_eq!(fs::metadata(current).expect("current").len(), 0);
    }
}

#[test]
fn per_device_order_is_log_run_archive_stop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let mut commander = commander(Arc::clone(&bridge), dir.path());
    commander.set_device_list(vec!["42".to_string()]);
    commander.set_iterations(2);

    commander.command_monkeys().expect("run");

    assert_eq!(
        bridge.calls(),
        vec![
            "kill 42",
            "log-start 42",
            "run 42 com.test.Example",
            "stop 42 com.test.Example",
            "run 42 com.test.Example",
            "stop 42 com.test.Example",
            "kill 42",
            "log-end 42",
        ]
    );
}

#[test]
fn monkey_errors_are_recorded_not_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge {
        monkey_exit: Some(251),
        ..FakeBridge::new()
    });
    let mut commander = commander(Arc::clone(&bridge), dir.path());
    commander.set_device_list(vec!["42".to_string()]);
    commander.set_iterations(3);

    let summary = commander.command_monkeys().expect("run");

    assert_eq!(summary.monkey_errors(), 3);
    let report = &summary.devices[0];
    assert!(report.completed);
    assert!(report.iterations.iter().all(|it| it.exit_code == Some(251)));
}

#[test]
fn cancel_stops_before_next_iteration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let placeholder = Arc::new(FakeBridge::new());
    let mut commander = commander(placeholder, dir.path());
    let bridge = Arc::new(FakeBridge {
        cancel_after_first_run: Some(commander.cancel_handle()),
        ..FakeBridge::new()
    });
    let shared: Arc<dyn DeviceBridge> = bridge.clone();
    commander.bridge = shared;
    commander.set_device_list(vec!["42".to_string()]);
    commander.set_iterations(5);

    let summary = commander.command_monkeys().expect("run");

    let report = &summary.devices[0];
    assert!(report.cancelled);
    assert!(!report.completed);
    assert_eq!(report.iterations.len(), 1);
    assert_eq!(bridge.count("run "), 1);
    assert_eq!(bridge.count("log-end "), 1);
}

#[test]
fn zero_iterations_still_sets_up_and_tears_down_logging() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let mut commander = commander(Arc::clone(&bridge), dir.path());
    commander.set_device_list(vec!["42".to_string()]);
    commander.set_iterations(0);

    let summary = commander.command_monkeys().expect("run");

    assert!(summary.devices[0].iterations.is_empty());
    assert_eq!(bridge.count("run "), 0);
    assert_eq!(bridge.count("log-start "), 1);
    assert_eq!(bridge.count("log-end "), 1);
}

#[test]
fn commander_can_run_again_after_a_failed_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge {
        fail_logging_for: Some("34555".to_string()),
        ..FakeBridge::new()
    });
    let mut commander = commander(Arc::clone(&bridge), dir.path());
    commander.set_device_list(vec!["80123".to_string(), "34555".to_string()]);
    commander.command_monkeys().expect_err("first run fails");

    commander.set_device_list(vec!["42".to_string()]);
    commander.set_iterations(2);
    let summary = commander.command_monkeys().expect("second run");

    let report = &summary.devices[0];
    assert!(report.completed);
    assert!(!report.cancelled);
    assert_eq!(report.iterations.len(), 2);
    assert_eq!(bridge.count("run 42"), 2);
}

#[test]
fn monkey_failure_mid_run_stops_the_other_devices() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge {
        fail_run_for: Some("43".to_string()),
        ..FakeBridge::new()
    });
    let mut commander = commander(Arc::clone(&bridge), dir.path());
    commander.set_device_list(vec!["42".to_string(), "43".to_string()]);
    commander.set_iterations(3);

    let err = commander.command_monkeys().expect_err("expected error");

    assert_eq!(err.code, "ERR_DEPENDENCY");
    assert_eq!(err.error, "adb connection reset");
    assert_ne!(err.error, NO_READY_DEVICES);
    // the healthy device finished its current iteration, then stopped
    assert_eq!(bridge.count("run 42"), 1);
    assert_eq!(bridge.count("stop 42"), 1);
    assert_eq!(bridge.count("run 43"), 1);
    assert_eq!(bridge.count("stop 43"), 0);
    assert_eq!(bridge.count("log-end "), 2);
    assert!(!commander.cancel_handle().load(Ordering::Relaxed));
}

#[test]
fn repeated_serials_get_a_single_worker() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bridge = Arc::new(FakeBridge::new());
    let mut commander = commander(Arc::clone(&bridge), dir.path());

    let devices = commander.detect_devices(Some("42,43, 42")).expect("detect");
    assert_eq!(devices, vec!["42", "43"]);

    commander.set_device_list(vec!["42".to_string(), "42".to_string()]);
    assert_eq!(commander.device_list(), Some(["42".to_string()].as_slice()));

    let summary = commander.command_monkeys().expect("run");

    assert_eq!(summary.devices.len(), 1);
    assert_eq!(bridge.count("log-start 42"), 1);
    assert_eq!(bridge.count("run 42"), 1);
}

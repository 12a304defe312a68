use std::collections::HashMap;
use std::process::Child;
use std::sync::Mutex;

use crate::app::error::AppError;

/// Host-side `adb logcat` process writing into a device's current log.
pub struct LogcatHandle {
    pub child: Child,
}

/// Running logcat captures keyed by device serial.
#[derive(Default)]
pub struct LogcatRegistry {
    processes: Mutex<HashMap<String, LogcatHandle>>,
}

impl LogcatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, serial: &str) -> bool {
        self.processes
            .lock()
            .map(|guard| guard.contains_key(serial))
            .unwrap_or(false)
    }

    /// Registers a capture. `spawn` only runs when no capture exists for `serial` yet.
    pub fn start(
        &self,
        serial: &str,
        trace_id: &str,
        spawn: impl FnOnce() -> Result<LogcatHandle, AppError>,
    ) -> Result<(), AppError> {
        let mut guard = self
            .processes
            .lock()
            .map_err(|_| AppError::system("Logcat registry locked", trace_id))?;
        if guard.contains_key(serial) {
            return Err(AppError::validation(
                format!("Logcat already running for {serial}"),
                trace_id,
            ));
        }
        let handle = spawn()?;
        guard.insert(serial.to_string(), handle);
        Ok(())
    }

    /// Kills and reaps the capture for `serial`. Returns false when none was running.
    pub fn stop(&self, serial: &str, trace_id: &str) -> Result<bool, AppError> {
        let mut guard = self
            .processes
            .lock()
            .map_err(|_| AppError::system("Logcat registry locked", trace_id))?;
        let Some(mut handle) = guard.remove(serial) else {
            return Ok(false);
        };
        drop(guard);
        let _ = handle.child.kill();
        let _ = handle.child.wait();
        Ok(true)
    }
}

impl Drop for LogcatRegistry {
    fn drop(&mut self) {
        if let Ok(guard) = self.processes.get_mut() {
            for handle in guard.values_mut() {
                let _ = handle.child.kill();
                let _ = handle.child.wait();
            }
        }
    }
}

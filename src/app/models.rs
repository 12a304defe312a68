use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IterationReport {
    pub index: u32,
    pub exit_code: Option<i32>,
    /// The monkey exited non-zero or was killed.
    pub monkey_error: bool,
    pub archived_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceReport {
    pub serial: String,
    pub completed: bool,
    pub cancelled: bool,
    pub iterations: Vec<IterationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeviceReport {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            completed: false,
            cancelled: false,
            iterations: Vec::new(),
            error: None,
        }
    }

    pub fn monkey_errors(&self) -> usize {
        self.iterations.iter().filter(|it| it.monkey_error).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub trace_id: String,
    pub app_id: String,
    pub log_dir: String,
    pub iterations: u32,
    pub devices: Vec<DeviceReport>,
}

impl RunSummary {
    pub fn monkey_errors(&self) -> usize {
        self.devices.iter().map(DeviceReport::monkey_errors).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdbInfo {
    pub available: bool,
    pub command_path: String,
    pub version_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

use crate::app::error::AppError;

/// `monkey_logs20131024_153000` style directory name.
pub fn log_dir_name<Tz: TimeZone>(prefix: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{prefix}{}", now.format("%Y%m%d_%H%M%S"))
}

/// Fresh per-run directory under `root`, named after the local time.
pub fn timestamped_log_dir(root: &Path, prefix: &str) -> PathBuf {
    root.join(log_dir_name(prefix, &Local::now()))
}

/// Serials such as `192.168.0.2:5555` are not valid file name parts everywhere.
pub fn sanitize_filename_component(value: &str) -> String {
    let sanitized: String = value
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "device".to_string()
    } else {
        sanitized
    }
}

pub fn current_log_path(log_dir: &Path, device: &str) -> PathBuf {
    log_dir.join(format!(
        "monkey_current{}.txt",
        sanitize_filename_component(device)
    ))
}

pub fn archive_log_path(log_dir: &Path, device: &str, iteration: u32) -> PathBuf {
    log_dir.join(format!(
        "monkeylog_{}_{iteration}.txt",
        sanitize_filename_component(device)
    ))
}

/// Returns true when the directory had to be created.
pub fn prepare_log_dir(log_dir: &Path, trace_id: &str) -> Result<bool, AppError> {
    if log_dir.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(log_dir).map_err(|err| {
        AppError::system(
            format!("Failed to create log dir {}: {err}", log_dir.display()),
            trace_id,
        )
    })?;
    Ok(true)
}

/// Copies the current log to `archive` and empties the current log.
pub fn archive_and_truncate(current: &Path, archive: &Path, trace_id: &str) -> Result<u64, AppError> {
    if !current.exists() {
        // logcat may not have written anything yet
        fs::write(current, b"").map_err(|err| {
            AppError::system(format!("Failed to create {}: {err}", current.display()), trace_id)
        })?;
    }
    let copied = fs::copy(current, archive).map_err(|err| {
        AppError::system(
            format!(
                "Failed to archive {} to {}: {err}",
                current.display(),
                archive.display()
            ),
            trace_id,
        )
    })?;
    OpenOptions::new()
        .write(true)
        .open(current)
        .and_then(|file| file.set_len(0))
        .map_err(|err| {
            AppError::system(format!("Failed to truncate {}: {err}", current.display()), trace_id)
        })?;
    Ok(copied)
}

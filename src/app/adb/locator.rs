use std::path::Path;

use crate::app::error::AppError;

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// A CLI override wins over the configured path; both empty means `adb` from `PATH`.
pub fn resolve_adb_program(cli_override: Option<&str>, config_command_path: &str) -> String {
    let normalized = cli_override
        .map(normalize_command_path)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| normalize_command_path(config_command_path));
    if normalized.is_empty() {
        "adb".to_string()
    } else {
        normalized
    }
}

pub fn validate_adb_program(program: &str, trace_id: &str) -> Result<(), AppError> {
    if program.trim().is_empty() {
        return Err(AppError::validation("ADB command is empty", trace_id));
    }
    if program == "adb" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err(AppError::validation(
            "ADB path must point to an executable file",
            trace_id,
        ));
    }
    if !path.exists() {
        return Err(AppError::validation(
            "ADB executable not found at the configured path",
            trace_id,
        ));
    }
    Ok(())
}

/// Whether `program` resolves to an executable, either as a path or through `PATH`.
pub fn adb_available(program: &str) -> bool {
    which::which(program).is_ok()
}

use crate::app::config::MonkeySettings;

/// Full adb argument list for one monkey run against `app_id` on `serial`.
///
/// `monkey` expects the event count as its final positional argument.
pub fn build_monkey_args(serial: &str, app_id: &str, settings: &MonkeySettings) -> Vec<String> {
    let mut args: Vec<String> = ["-s", serial, "shell", "monkey", "-p", app_id]
        .iter()
        .map(|value| value.to_string())
        .collect();
    if let Some(seed) = settings.seed {
        args.push("-s".to_string());
        args.push(seed.to_string());
    }
    args.push("-v".to_string());
    args.push("--throttle".to_string());
    args.push(settings.throttle_ms.to_string());
    if settings.ignore_timeouts {
        args.push("--ignore-timeouts".to_string());
    }
    args.push("--pct-majornav".to_string());
    args.push(settings.pct_majornav.to_string());
    args.push("--pct-appswitch".to_string());
    args.push(settings.pct_appswitch.to_string());
    if settings.kill_process_after_error {
        args.push("--kill-process-after-error".to_string());
    }
    args.extend(settings.extra_args.split_whitespace().map(str::to_string));
    args.push(settings.event_count.to_string());
    args
}

use std::sync::OnceLock;

use regex::Regex;

pub const MONKEY_PROCESS: &str = "com.android.commands.monkey";
pub const LOGCAT_PROCESS: &str = "logcat";

/// Serials from `adb devices` output whose state is `device`.
///
/// Offline and unauthorized entries are dropped, as are the header and the
/// `* daemon started` chatter.
pub fn parse_device_serials(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            let state = tokens.next()?;
            (state == "device").then(|| serial.to_string())
        })
        .collect()
}

fn ps_row_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // USER PID ... NAME
    RE.get_or_init(|| Regex::new(r"^\s*\S+\s+(\d+)\s.*?(\S+)\s*$").expect("valid ps regex"))
}

/// PIDs of `ps` rows whose trailing NAME column is `process_name`.
pub fn parse_ps_pids(output: &str, process_name: &str) -> Vec<u32> {
    let re = ps_row_regex();
    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            if &caps[2] != process_name {
                return None;
            }
            caps[1].parse::<u32>().ok()
        })
        .collect()
}

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::bridge::AdbBridge;
use crate::app::adb::locator::{adb_available, resolve_adb_program, validate_adb_program};
use crate::app::commander::MonkeyCommander;
use crate::app::config::{
    config_path, load_config_from_path, save_config_to_path, AppConfig,
};
use crate::app::error::AppError;
use crate::app::models::{AdbInfo, RunSummary};
use crate::app::paths::timestamped_log_dir;

#[derive(Parser, Debug)]
#[command(
    name = "monkey_master",
    about = "Run Android monkey stress tests on several devices in parallel",
    version,
    long_about = None
)]
pub struct Cli {
    /// Path to the adb executable (overrides the config file)
    #[arg(long, global = true)]
    pub adb: Option<String>,

    /// Config file (defaults to $MONKEY_MASTER_CONFIG_PATH or ~/.monkey_master_config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run monkeys against an app on every selected device
    Run {
        /// Application id, e.g. com.innovaptor.MonkeyTestApp
        app_id: String,

        /// Comma separated device serials; detected through adb when omitted
        #[arg(long)]
        devices: Option<String>,

        /// Monkey iterations per device
        #[arg(long)]
        iterations: Option<u32>,

        /// Directory in which the timestamped log folder is created
        #[arg(long)]
        log_root: Option<PathBuf>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Kill stray monkeys and logcat captures
    Kill {
        /// Comma separated device serials; detected through adb when omitted
        #[arg(long)]
        devices: Option<String>,
    },

    /// List connected devices that are ready
    Devices,

    /// Check that adb can be found and run
    Check {
        #[arg(long)]
        json: bool,
    },

    /// Show or initialise the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective config
    Show,
    /// Write the default config (keeps a backup of an existing file)
    Init,
}

pub struct Context {
    pub trace_id: String,
    pub config: AppConfig,
    pub config_path: PathBuf,
    pub adb_program: String,
}

impl Context {
    pub fn load(cli: &Cli) -> Result<Self, AppError> {
        let trace_id = Uuid::new_v4().to_string();
        let config_path = cli.config.clone().unwrap_or_else(config_path);
        let mut config = load_config_from_path(&config_path, &trace_id)?;
        if let Some(level) = cli.log_level.as_deref().filter(|level| !level.trim().is_empty()) {
            config.logging.log_level = level.to_string();
        }
        let adb_program = resolve_adb_program(cli.adb.as_deref(), &config.adb.command_path);
        Ok(Self {
            trace_id,
            config,
            config_path,
            adb_program,
        })
    }

    fn bridge(&self) -> Result<AdbBridge, AppError> {
        validate_adb_program(&self.adb_program, &self.trace_id)?;
        Ok(AdbBridge::new(
            self.adb_program.clone(),
            self.config.monkey.clone(),
            self.config.logcat.clone(),
        ))
    }
}

pub fn execute(cli: Cli, ctx: &Context) -> Result<(), AppError> {
    match cli.command {
        Commands::Run {
            app_id,
            devices,
            iterations,
            log_root,
            json,
        } => {
            let log_root = log_root.unwrap_or_else(|| PathBuf::from(&ctx.config.run.log_root));
            let iterations = iterations.unwrap_or(ctx.config.run.iterations);
            let summary = run_monkeys(ctx, app_id, devices.as_deref(), iterations, &log_root)?;
            print_summary(&summary, json);
            Ok(())
        }
        Commands::Kill { devices } => {
            let bridge = Arc::new(ctx.bridge()?);
            let mut commander =
                MonkeyCommander::new(None, bridge).with_trace_id(ctx.trace_id.clone());
            commander.detect_devices(devices.as_deref())?;
            commander.kill_monkeys();
            commander.end_logging();
            Ok(())
        }
        Commands::Devices => {
            let bridge = Arc::new(ctx.bridge()?);
            let mut commander =
                MonkeyCommander::new(None, bridge).with_trace_id(ctx.trace_id.clone());
            for device in commander.detect_devices(None)? {
                println!("{device}");
            }
            Ok(())
        }
        Commands::Check { json } => {
            let info = check_adb(ctx);
            if json {
                println!("{}", serde_json::to_string_pretty(&info).unwrap_or_default());
            } else if info.available {
                println!("adb: {}\n{}", info.command_path, info.version_output);
            } else {
                println!(
                    "adb: {} unavailable: {}",
                    info.command_path,
                    info.error.as_deref().unwrap_or("unknown error")
                );
            }
            if info.available {
                Ok(())
            } else {
                Err(AppError::dependency("adb is not available", &ctx.trace_id))
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let payload = serde_json::to_string_pretty(&ctx.config).map_err(|err| {
                    AppError::system(format!("Failed to serialize config: {err}"), &ctx.trace_id)
                })?;
                println!("{payload}");
                Ok(())
            }
            ConfigAction::Init => {
                save_config_to_path(&AppConfig::default(), &ctx.config_path, &ctx.trace_id)?;
                println!("wrote {}", ctx.config_path.display());
                Ok(())
            }
        },
    }
}

fn run_monkeys(
    ctx: &Context,
    app_id: String,
    devices: Option<&str>,
    iterations: u32,
    log_root: &Path,
) -> Result<RunSummary, AppError> {
    let bridge = Arc::new(ctx.bridge()?);
    let log_dir = timestamped_log_dir(log_root, &ctx.config.run.log_dir_prefix);
    let mut commander = MonkeyCommander::new(Some(app_id), bridge)
        .with_log_dir(log_dir)
        .with_trace_id(ctx.trace_id.clone());
    commander.set_iterations(iterations);
    commander.detect_devices(devices)?;
    info!(
        trace_id = %ctx.trace_id,
        devices = ?commander.device_list(),
        iterations,
        "starting monkey run"
    );

    watch_for_interrupt(commander.cancel_handle(), ctx.trace_id.clone());
    let summary = commander.command_monkeys()?;
    write_summary_file(&summary, commander.log_dir(), &ctx.trace_id);
    Ok(summary)
}

/// Ctrl-C stops every worker before its next iteration; the commander still runs its cleanup.
fn watch_for_interrupt(cancel: Arc<AtomicBool>, trace_id: String) {
    std::thread::spawn(move || cancel_on(tokio::signal::ctrl_c(), &cancel, &trace_id));
}

fn cancel_on<F>(signal: F, cancel: &AtomicBool, trace_id: &str)
where
    F: Future<Output = io::Result<()>>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "failed to start the interrupt watcher");
            return;
        }
    };
    match runtime.block_on(signal) {
        Ok(()) => {
            warn!(trace_id = %trace_id, "interrupted, stopping after the current iteration");
            cancel.store(true, Ordering::Relaxed);
        }
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "failed to listen for Ctrl-C");
        }
    }
}

fn write_summary_file(summary: &RunSummary, log_dir: &Path, trace_id: &str) {
    let path = log_dir.join("run_summary.json");
    let payload = match serde_json::to_string_pretty(summary) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err, "failed to serialize run summary");
            return;
        }
    };
    if let Err(err) = fs::write(&path, payload) {
        warn!(trace_id = %trace_id, error = %err, path = %path.display(), "failed to write run summary");
    }
}

fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
        return;
    }
    println!("log dir: {}", summary.log_dir);
    for device in &summary.devices {
        let status = if device.cancelled { "cancelled" } else { "done" };
        println!(
            "{}: {} iterations, {} monkey errors ({status})",
            device.serial,
            device.iterations.len(),
            device.monkey_errors()
        );
    }
}

pub fn check_adb(ctx: &Context) -> AdbInfo {
    let program = ctx.adb_program.clone();
    let unavailable = |error: String| AdbInfo {
        available: false,
        command_path: program.clone(),
        version_output: String::new(),
        error: Some(error),
    };

    if let Err(err) = validate_adb_program(&program, &ctx.trace_id) {
        return unavailable(err.error);
    }
    if !adb_available(&program) {
        return unavailable("adb executable not found on PATH".to_string());
    }
    let bridge = AdbBridge::new(
        program.clone(),
        ctx.config.monkey.clone(),
        ctx.config.logcat.clone(),
    );
    match bridge.version(&ctx.trace_id) {
        Ok(version_output) => AdbInfo {
            available: true,
            command_path: program.clone(),
            version_output,
            error: None,
        },
        Err(err) => unavailable(err.error),
    }
}

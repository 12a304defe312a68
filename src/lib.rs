pub mod app;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use app::cli::{execute, Cli, Context};
use app::logging::init_logging;

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let ctx = match Context::load(&cli) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(err.exit_code());
        }
    };
    init_logging(&ctx.config.logging);

    match execute(cli, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(trace_id = %err.trace_id, code = %err.code, "{}", err.error);
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

use std::process::ExitCode;

fn main() -> ExitCode {
    monkey_master_lib::run()
}

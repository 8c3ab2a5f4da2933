use std::process::ExitCode;

fn main() -> ExitCode {
    outlay_cli::run()
}

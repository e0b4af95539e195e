use std::process::ExitCode;

fn main() -> ExitCode {
    hostline_cli::run()
}

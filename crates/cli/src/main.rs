use std::process::ExitCode;

fn main() -> ExitCode {
    bondline_cli::run()
}

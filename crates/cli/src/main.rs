use std::process::ExitCode;

fn main() -> ExitCode {
    mendy_cli::run()
}

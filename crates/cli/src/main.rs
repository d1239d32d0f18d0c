use std::process::ExitCode;

fn main() -> ExitCode {
    railsql_cli::run()
}

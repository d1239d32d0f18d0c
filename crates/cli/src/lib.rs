pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "railsql",
    about = "railsql operator CLI",
    long_about = "Ask railway delay questions, run question batches, and check runtime readiness.",
    after_help = "Examples:\n  railsql ask \"Wie viele Züge waren gestern verspätet?\"\n  \
                  railsql batch questions.txt --model-query openai\n  railsql doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer one question and print the turn as JSON")]
    Ask(AskArgs),
    #[command(about = "Answer every question in a file (one per line) and print a JSON report")]
    Batch(BatchArgs),
    #[command(about = "Apply pending application store migrations")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, application store and warehouse connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run end-to-end readiness checks including a dry-run turn")]
    Smoke,
}

#[derive(Clone, Debug, Default, Args)]
pub struct ModelArgs {
    #[arg(long, help = "Backend for routing and SQL generation (mistral|openai|google|dryrun)")]
    pub model_query: Option<String>,
    #[arg(long, help = "Backend for answer synthesis (mistral|openai|google|dryrun)")]
    pub model_interpret: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct AskArgs {
    pub question: String,
    #[command(flatten)]
    pub models: ModelArgs,
    #[arg(long, help = "Conversation thread to restore and checkpoint")]
    pub thread: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct BatchArgs {
    pub file: PathBuf,
    #[command(flatten)]
    pub models: ModelArgs,
}

pub fn run() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask(args) => commands::ask::run(args),
        Command::Batch(args) => commands::batch::run(args),
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Smoke => commands::smoke::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only command output.
fn init_logging() {
    let filter = EnvFilter::try_from_env("RAILSQL_CLI_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley operator CLI",
    long_about = "Operate Parley: run one-shot chat turns, inspect configuration, and check provider readiness.",
    after_help = "Examples:\n  parley chat \"show me 5 customers\"\n  parley config\n  parley doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Submit one chat message and print the resulting fragment")]
    Chat {
        #[arg(help = "The user message to submit")]
        message: String,
        #[arg(long, help = "Emit the final fragment as machine-readable JSON")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and provider credential readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { message, json } => commands::chat::run(&message, json),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

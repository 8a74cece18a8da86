pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "concierge",
    about = "Shopping concierge operator CLI",
    long_about = "Ask the shopping concierge for a recommendation, hold a multi-turn chat, and inspect runtime readiness.",
    after_help = "Examples:\n  concierge ask \"iphone 15 pro max 256\" --trusted-only\n  concierge chat\n  concierge doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one shopping request and print the recommendation")]
    Ask {
        #[arg(help = "What you are looking for, in any language")]
        query: String,
        #[arg(long, help = "Only recommend offers from trusted retailers")]
        trusted_only: bool,
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Interactive session that answers clarification questions in turn")]
    Chat {
        #[arg(long, help = "Only recommend offers from trusted retailers")]
        trusted_only: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, provider credentials, and runtime wiring")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { query, trusted_only, json } => {
            commands::ask::run(&query, trusted_only, json)
        }
        Command::Chat { trusted_only } => commands::chat::run(trusted_only),
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

pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "bondline",
    about = "Bondline operator CLI",
    long_about = "Inspect Bondline configuration, check capability wiring, and exercise the dispatcher and approval preview locally.",
    after_help = "Examples:\n  bondline doctor --json\n  bondline config\n  bondline classify \"suggest follow-up prompts\"\n  bondline preview --to ops@example.com --subject Hi --body Hello"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and capability endpoint wiring")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the dispatch path an utterance would take")]
    Classify {
        #[arg(help = "Utterance to classify")]
        utterance: String,
    },
    #[command(about = "Validate a message locally and print its preview token without sending")]
    Preview {
        #[arg(long, help = "Recipient email address")]
        to: String,
        #[arg(long, help = "Message subject")]
        subject: String,
        #[arg(long, help = "Message body")]
        body: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Classify { utterance } => commands::classify::run(&utterance),
        Command::Preview { to, subject, body } => commands::preview::run(&to, &subject, &body),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

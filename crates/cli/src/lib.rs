pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "canvass",
    about = "Canvass operator CLI",
    long_about = "Apply migrations, inspect configuration, move survey definitions between stores, and read survey analytics.",
    after_help = "Examples:\n  canvass migrate\n  canvass export 6f1c0c52-5d0e-4b8e-9a64-0d3c1a7e4a10 > survey.json\n  canvass import survey.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Print the effective configuration as JSON with source attribution")]
    Config,
    #[command(about = "Print a survey definition as a portable JSON document")]
    Export {
        #[arg(help = "Survey id")]
        survey_id: String,
    },
    #[command(about = "Create or update a survey from an export document")]
    Import {
        #[arg(help = "Path to an export JSON file")]
        file: PathBuf,
    },
    #[command(about = "Print aggregated response analytics for a survey")]
    Analytics {
        #[arg(help = "Survey id")]
        survey_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Export { survey_id } => commands::export::run(&survey_id),
        Command::Import { file } => commands::import::run(&file),
        Command::Analytics { survey_id } => commands::analytics::run(&survey_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

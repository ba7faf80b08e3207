use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use parley::cli::validate::RecordKind;
use parley::cli::{inspect, reassemble, request, validate};
use parley::config::Config;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Validate and inspect conversation and ERNIE chat records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "parley.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a record file, or every JSON file in a directory
    Validate {
        /// File or directory
        path: PathBuf,

        /// Record type the files hold
        #[arg(short, long, value_enum, default_value = "conversation")]
        kind: RecordKind,
    },

    /// Show a conversation's settings and turns
    Inspect {
        /// Conversation JSON file
        conversation: PathBuf,
    },

    /// Print the ERNIE chat request for a conversation's next turn
    Request {
        /// Conversation JSON file
        conversation: PathBuf,

        /// Persona JSON file supplying the system prompt
        #[arg(short, long)]
        persona: Option<PathBuf>,
    },

    /// Join streamed partial responses (one JSON object per line)
    Reassemble {
        /// Stream capture file
        stream: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = Config::load(&cli.config)?;

    parley::logging::init(&config.logging);

    match cli.command {
        Commands::Validate { path, kind } => {
            validate::run(&path, kind)?;
        }
        Commands::Inspect { conversation } => {
            inspect::run(&config, &conversation)?;
        }
        Commands::Request {
            conversation,
            persona,
        } => {
            request::run(&config, &conversation, persona.as_deref())?;
        }
        Commands::Reassemble { stream } => {
            reassemble::run(&stream)?;
        }
    }

    Ok(())
}

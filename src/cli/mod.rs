//! Command-line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medrag")]
#[command(about = "Retrieval-augmented clinical question answering over a local knowledge base")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file (defaults to the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest documents into the knowledge base
    Ingest {
        /// A JSON document file, or a directory of .md/.txt files
        input: PathBuf,
    },

    /// Ask a question against the indexed knowledge base
    Query {
        /// The question to answer
        question: String,

        /// Override the configured number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the full response as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Run the retrieval evaluation harness against a labeled case set
    Eval {
        /// JSON file with evaluation cases
        cases: PathBuf,

        /// Report output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show index and pipeline statistics
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration file
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_parses_overrides() {
        let cli = Cli::parse_from(["medrag", "query", "sepsis antibiotics", "-k", "3", "--json"]);
        match cli.command {
            Commands::Query {
                question,
                top_k,
                json,
            } => {
                assert_eq!(question, "sepsis antibiotics");
                assert_eq!(top_k, Some(3));
                assert!(json);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn ingest_takes_a_path() {
        let cli = Cli::parse_from(["medrag", "ingest", "./guidelines"]);
        match cli.command {
            Commands::Ingest { input } => assert_eq!(input, PathBuf::from("./guidelines")),
            _ => panic!("expected ingest command"),
        }
    }
}

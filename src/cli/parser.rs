//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// jibsa: Korean real-estate assistant engine.
///
/// Team-based supervisor over hybrid legal retrieval. `ingest` a
/// corpus once, then `query` or `chat` against it.
#[derive(Parser, Debug)]
#[command(name = "jibsa")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the corpus/session database file.
    ///
    /// Defaults to `.jibsa/jibsa.db` in the current directory.
    #[arg(short, long, env = "JIBSA_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a JSONL corpus into the catalog and vector index.
    Ingest {
        /// Path to the JSONL corpus file.
        corpus: PathBuf,
    },

    /// Run one query turn and print the answer.
    Query {
        /// The question to ask.
        text: String,

        /// Session to run the turn in.
        #[arg(short, long, default_value = "cli")]
        session: String,

        /// Print the structured result as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Interactive chat over one session.
    Chat {
        /// Session to chat in.
        #[arg(short, long, default_value = "cli")]
        session: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::try_parse_from(["jibsa", "query", "전세금 인상 한도", "--session", "s1"])
            .unwrap_or_else(|_| unreachable!());
        match cli.command {
            Commands::Query { text, session, json } => {
                assert_eq!(text, "전세금 인상 한도");
                assert_eq!(session, "s1");
                assert!(!json);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_ingest_command() {
        let cli = Cli::try_parse_from(["jibsa", "ingest", "corpus.jsonl"])
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(cli.command, Commands::Ingest { .. }));
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["jibsa"]).is_err());
    }
}

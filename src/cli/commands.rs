//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - ask: run the two-agent conversation on a request
//! - validate: check a query with the local validator
//! - show: print a saved transcript

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// kqlpair - natural language to KQL with a generator and a validator agent
#[derive(Parser, Debug)]
#[command(name = "kqlpair")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Turn a natural-language request into a validated KQL query
    Ask {
        /// The request, e.g. "SQL servers with the highest read latency today"
        request: String,

        /// Maximum number of agent turns
        #[arg(short, long)]
        max_iterations: Option<u32>,

        /// Print whole messages instead of streaming them
        #[arg(long)]
        no_stream: bool,

        /// Save the conversation to this JSONL file
        #[arg(short, long)]
        transcript: Option<PathBuf>,

        /// Continue from a saved transcript instead of starting fresh
        #[arg(long, value_name = "TRANSCRIPT")]
        resume: Option<PathBuf>,
    },

    /// Validate a query without calling the model
    Validate {
        /// Query text, or "-" to read from stdin
        query: String,
    },

    /// Print a saved transcript
    Show {
        /// Path to a JSONL transcript
        transcript: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["kqlpair"]).is_err());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["kqlpair", "-v", "validate", "T"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["kqlpair", "-c", "/path/to/kqlpair.yml", "show", "t.jsonl"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/kqlpair.yml")));
    }

    #[test]
    fn test_ask_defaults() {
        let cli = Cli::try_parse_from(["kqlpair", "ask", "all events"]).unwrap();
        match cli.command {
            Commands::Ask {
                request,
                max_iterations,
                no_stream,
                transcript,
                resume,
            } => {
                assert_eq!(request, "all events");
                assert!(max_iterations.is_none());
                assert!(!no_stream);
                assert!(transcript.is_none());
                assert!(resume.is_none());
            }
            _ => panic!("Expected ask command"),
        }
    }

    #[test]
    fn test_ask_options() {
        let cli = Cli::try_parse_from([
            "kqlpair",
            "ask",
            "all events",
            "--max-iterations",
            "4",
            "--no-stream",
            "--transcript",
            "out.jsonl",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                max_iterations,
                no_stream,
                transcript,
                ..
            } => {
                assert_eq!(max_iterations, Some(4));
                assert!(no_stream);
                assert_eq!(transcript, Some(PathBuf::from("out.jsonl")));
            }
            _ => panic!("Expected ask command"),
        }
    }

    #[test]
    fn test_validate_stdin_marker() {
        let cli = Cli::try_parse_from(["kqlpair", "validate", "-"]).unwrap();
        match cli.command {
            Commands::Validate { query } => assert_eq!(query, "-"),
            _ => panic!("Expected validate command"),
        }
    }

    #[test]
    fn test_show_requires_path() {
        assert!(Cli::try_parse_from(["kqlpair", "show"]).is_err());
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}

//! CLI module for kqlpair - command-line interface and subcommands.
//!
//! Provides the entry point for running a query conversation, validating a
//! query locally and printing saved transcripts.

pub mod commands;

pub use commands::Cli;

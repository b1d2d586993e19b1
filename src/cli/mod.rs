//! Command-line interface for lean-forge.
//!
//! Provides commands for runtime provisioning, proof checking, lemma search
//! and workspace cleanup.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, OutputFormat};

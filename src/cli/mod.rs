//! Command-line interface for compose-forge.
//!
//! Provides commands for planning and running tasks, inspecting the
//! capability catalog and listing learned configurations.

mod commands;

pub use commands::{parse_cli, parse_context_arg, run, run_with_cli, Cli, Commands};

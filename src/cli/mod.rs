//! Command-line interface for code-runner.
//!
//! Provides the `serve` command that runs the HTTP service and the
//! `languages` command that lists the language table.

mod commands;

pub use commands::{
    parse_cli, run, run_with_cli, Cli, Commands, LanguagesArgs, ServeArgs,
};

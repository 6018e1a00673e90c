//! CLI module for jobwait - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;

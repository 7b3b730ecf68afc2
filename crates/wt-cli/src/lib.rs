//! Watch-session analytics CLI library.
//!
//! This crate provides the CLI interface over the interval store.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{Config, ConsolidationSettings};

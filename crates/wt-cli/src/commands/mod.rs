//! CLI subcommand implementations.

pub mod concurrency;
pub mod consolidate;
pub mod import;
pub mod sessions;
pub mod status;
pub mod util;

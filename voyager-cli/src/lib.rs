//! Voyager CLI library: configuration loading and command execution.
//!
//! Split from the binary so integration tests can load `voyager.toml`
//! and drive commands without spawning a process.

pub mod cli;
pub mod config;

pub use cli::{execute_command, App, Commands};
pub use config::{Config, StoreBackend};

//! Terminal user interface.

pub mod command;
pub mod error;
pub mod formatter;
pub mod prompt;
pub mod runner;

pub use runner::{RunOptions, run_client};

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod errors;

// Re-export main public types
pub use client::{Client, Selection, SelectionRequest};
pub use config::Settings;
pub use errors::{CloudSelectError, ConfigError, Result};

//! Foundry Logger
//!
//! A lightweight handle over the `log` facade. Records are emitted under the
//! target `workforge::<foundry name>` so one run's output can be filtered
//! with `RUST_LOG=workforge::orders=debug`.

use std::fmt::Display;

use log::Level;

/// Logger reference carried by every [`super::Foundry`].
#[derive(Debug, Clone)]
pub struct ForgeLogger {
    target: String,
}

impl ForgeLogger {
    /// Creates a logger for the named foundry.
    pub fn new(foundry_name: &str) -> Self {
        Self {
            target: format!("workforge::{}", foundry_name),
        }
    }

    /// The `log` target used for every record.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self, level: Level, message: impl Display) {
        log::log!(target: self.target.as_str(), level, "{}", message);
    }

    pub fn debug(&self, message: impl Display) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl Display) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl Display) {
        self.log(Level::Error, message);
    }
}

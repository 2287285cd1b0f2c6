//! Execution Context Module
//!
//! The per-run context shared by every operation of a workflow run.
//!
//! - [`context`]: The [`Foundry`] property bag and its accessors
//! - [`value`]: Tagged [`DataValue`] and typed extraction
//! - [`logger`]: Per-foundry logger handle

pub mod context;
pub mod logger;
pub mod value;

pub use context::Foundry;
pub use logger::ForgeLogger;
pub use value::{DataValue, FromDataValue};

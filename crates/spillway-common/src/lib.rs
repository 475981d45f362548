//! # spillway-common
//!
//! Foundation layer for Spillway: record types, configuration, and errors.
//!
//! This crate provides the building blocks shared by the spill engine and
//! its tools. It has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Record types ([`Value`], [`Tuple`])
//! - [`config`] - Spill configuration ([`SpillConfig`])
//! - [`utils`] - Utility functions and helpers (errors)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use config::{ConfigError, PartitionSpillPolicy, SpillConfig};
pub use types::{Tuple, Value};
pub use utils::error::{Error, Result};

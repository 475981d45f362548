//! Common utilities used throughout Spillway.
//!
//! - [`error`] - Error types like [`Error`]

pub mod error;

pub use error::{Error, Result};

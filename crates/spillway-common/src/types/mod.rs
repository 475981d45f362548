//! Core type definitions for Spillway.
//!
//! - [`Value`] - a single dynamically typed cell
//! - [`Tuple`] - an ordered, fixed-arity record of values

mod tuple;
mod value;

pub use tuple::Tuple;
pub use value::Value;

//! Common utilities for streamzip.
//!
//! This crate provides the foundational pieces shared by the streamzip crates:
//!
//! - [`BinaryReader`] - Bounds-checked binary reading from byte slices
//! - [`Error`] / [`Result`] - The common error type

mod error;
mod reader;

pub use error::{Error, Result};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

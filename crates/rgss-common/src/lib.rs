//! Common utilities for rgss.
//!
//! This crate provides foundational types and utilities used across the rgss crates:
//!
//! - [`BinaryReader`] - Zero-copy binary reading from byte slices
//! - [`path`] - Normalization of archive entry paths

mod error;
mod reader;

pub mod path;

pub use error::{Error, Result};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

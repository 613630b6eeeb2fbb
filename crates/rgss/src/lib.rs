//! Rgss - RPG Maker encrypted archive library.
//!
//! This crate provides a unified interface to the rgss crates for working
//! with RPG Maker XP, VX and VX Ace game archives.
//!
//! # Crates
//!
//! - [`rgss_common`] - Common utilities (binary reading, path normalization)
//! - [`rgss_archive`] - RGSSAD/RGSS2A/RGSS3A reading (key streams, random access)
//!
//! # Example
//!
//! ```no_run
//! use rgss::prelude::*;
//!
//! let archive = Archive::open("Game.rgssad")?;
//!
//! if let Some(entry) = archive.find("Data\\Scripts.rxdata") {
//!     let data = archive.read_entry(entry)?;
//!     println!("{}: {} bytes", entry.path(), data.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use rgss_archive as archive;
pub use rgss_common as common;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use rgss_archive::{
        Archive, ContentStream, DirectoryListing, EntryRecord, ErrorKind, FileHandle, NodeKind,
        Resolved, Version,
    };
    pub use rgss_common::BinaryReader;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

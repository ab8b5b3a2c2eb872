//! # Accord Shared
//!
//! Common types and interfaces used across all Accord packages.

pub mod config;
pub mod error;
pub mod link;
pub mod message;
pub mod profile;
pub mod relation;

// Re-exports
pub use config::*;
pub use error::*;
pub use link::*;
pub use message::*;
pub use profile::*;
pub use relation::*;

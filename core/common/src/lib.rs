//! Common utilities and types shared across bwbridge crates.
//!
//! This crate provides the error taxonomy used by every layer and the
//! secret wrapper that keeps master passwords and session keys out of logs.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::SensitiveString;

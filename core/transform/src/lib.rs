//! Structural JSON transforms for bwbridge.
//!
//! This module provides:
//! - A declarative conversion descriptor (`Conversion`) mirroring the shape
//!   of the document it applies to
//! - Key renaming through nested maps and lists (`transform_keys`)
//! - Enclosure of singleton maps into one-element lists (`enclose`)
//!
//! # Architecture
//! Both transforms run in place over a `serde_json::Value` and share a single
//! recursive walk that dispatches on the descriptor node. Shape disagreements
//! between descriptor and document are reported, never coerced.

pub mod conversion;
pub mod engine;

pub use conversion::{Conversion, ConversionNode};
pub use engine::{enclose, transform_keys};

//! Session management and item access for the Bitwarden CLI.
//!
//! This module provides:
//! - Configuration of the tool binary, server and identity
//! - A process runner that feeds secrets over stdin and isolates JSON output
//! - Decoding of the tool's `success`/`message`/`data` envelope
//! - A session lifecycle manager with idempotent `ensure_*` transitions
//! - An item catalog that reshapes listed items for callers
//!
//! # Architecture
//! Callers go through `ItemCatalog` or `SessionManager`. The manager checks
//! live status before every transition and serializes mutations behind its
//! own locks; every tool invocation runs through `Runner`, which wraps an
//! `Executor` so the real process can be replaced by `MockVault` in tests.

pub mod catalog;
pub mod command;
pub mod config;
pub mod mock;
pub mod response;
pub mod runner;
pub mod session;
pub mod status;

pub use catalog::{ItemCatalog, VaultItem};
pub use command::{Invocation, Tool};
pub use config::ClientConfig;
pub use mock::MockVault;
pub use response::{decode, decode_data_on_success, Envelope};
pub use runner::{isolate_json, Executor, ProcessExecutor, RawOutput, Runner};
pub use session::{Identity, SessionManager};
pub use status::{AuthStatus, SessionData, SessionState, Status};

//! Common error types for bwbridge.

use thiserror::Error;

/// Top-level error type for bwbridge operations.
///
/// Variants carry the command name and the raw text involved so a failure
/// can be diagnosed without re-running the vault tool.
#[derive(Debug, Error)]
pub enum Error {
    /// The external tool exited with a code that was not accepted.
    #[error("cannot {command}: {output}\nexit code: {status}")]
    ProcessFailed {
        command: String,
        output: String,
        status: String,
    },

    /// The external tool could not be started.
    #[error("failed to launch {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The external tool did not finish in time and was killed.
    #[error("{command} timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    /// The secret could not be written to the tool's input stream.
    #[error("failed to deliver secret to {command}: {source}")]
    SecretDelivery {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Output was not well-formed JSON.
    #[error("cannot unmarshal response from {command}: {detail}\n{raw}")]
    MalformedOutput {
        command: String,
        raw: String,
        detail: String,
    },

    /// Interactive prompt text could not be separated from the JSON payload.
    #[error("failed to trim interactive prompts from output:\n{raw}\n-->\n{processed}")]
    PromptNotStripped { raw: String, processed: String },

    /// A response decoded fine but did not have the expected shape.
    #[error("unexpected {command} output:\n{output}")]
    UnexpectedOutput { command: String, output: String },

    /// A conversion descriptor disagrees with the document it is applied to.
    #[error("conversion doesn't match input structure at '{key}' (expected {expected}):\n{descriptor}\n{document}")]
    StructuralMismatch {
        key: String,
        expected: &'static str,
        descriptor: String,
        document: String,
    },

    /// An enclosure target held something other than a map.
    #[error("given non-map to enclose at '{key}', expected map:\n{document}")]
    NotEnclosable { key: String, document: String },

    /// A conversion descriptor is malformed.
    #[error("Unexpected conversion format: {0}")]
    Descriptor(String),

    /// The tool's persisted account differs from the configured identity.
    #[error("Identity mismatch: {0}")]
    IdentityMismatch(String),

    /// The tool answered with `success: false`.
    #[error("unsuccessful {command}: {message}")]
    Envelope { command: String, message: String },

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

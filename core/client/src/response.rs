//! Decoding of the tool's response envelope.

use serde::Deserialize;
use serde_json::Value;

use bwbridge_common::{Error, Result};
use bwbridge_transform::{transform_keys, Conversion};

/// The `--response` wrapper around every tool answer.
///
/// On failure `message` carries the reason; on success `data` carries the
/// payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    /// Take the payload of a successful envelope.
    ///
    /// A successful envelope without `data` yields `Value::Null`.
    ///
    /// # Errors
    /// - `success` is false; the error carries `message`
    pub fn into_data(self, command: &str) -> Result<Value> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(Error::Envelope {
                command: command.to_string(),
                message: self.message.unwrap_or_default(),
            })
        }
    }
}

/// Parse `raw` as an envelope, renaming keys with `conversion` first.
///
/// # Errors
/// - `raw` is not well-formed JSON
/// - `conversion` does not fit the document
/// - The document is not envelope-shaped
pub fn decode(command: &str, raw: &[u8], conversion: Option<&Conversion>) -> Result<Envelope> {
    let mut document: Value = serde_json::from_slice(raw).map_err(|e| Error::MalformedOutput {
        command: command.to_string(),
        raw: String::from_utf8_lossy(raw).into_owned(),
        detail: e.to_string(),
    })?;

    if let Some(conversion) = conversion {
        transform_keys(&mut document, conversion)?;
    }

    Envelope::deserialize(&document).map_err(|e| Error::UnexpectedOutput {
        command: command.to_string(),
        output: format!("{}: {}", e, document),
    })
}

/// Decode `raw` and return its `data` when the tool reported success.
///
/// # Errors
/// - Any `decode` error
/// - `success` is false; the error carries the tool's message
pub fn decode_data_on_success(
    command: &str,
    raw: &[u8],
    conversion: Option<&Conversion>,
) -> Result<Value> {
    decode(command, raw, conversion)?.into_data(command)
}

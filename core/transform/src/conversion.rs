//! Conversion descriptors.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use bwbridge_common::{Error, Result};

/// A single descriptor entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionNode {
    /// Move the value at this key to the given key.
    Rename(String),
    /// Wrap the map at this key into a one-element list.
    Enclose,
    /// Apply a nested conversion to the map at this key.
    Descend(Conversion),
    /// Apply every nested conversion to every map in the list at this key.
    DescendEach(Vec<Conversion>),
}

impl ConversionNode {
    /// Parse a node from its JSON form.
    ///
    /// A string is a rename target, `null` marks an enclosure, an object
    /// descends into a map and an array of objects descends into each item
    /// of a list.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(target) => Ok(Self::Rename(target.clone())),
            Value::Null => Ok(Self::Enclose),
            Value::Object(_) => Ok(Self::Descend(Conversion::from_value(value)?)),
            Value::Array(items) => items
                .iter()
                .map(Conversion::from_value)
                .collect::<Result<Vec<_>>>()
                .map(Self::DescendEach),
            other => Err(Error::Descriptor(format!(
                "expected string, null, object or array, got {}",
                other
            ))),
        }
    }

    /// Render the node back to its JSON form.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Rename(target) => Value::String(target.clone()),
            Self::Enclose => Value::Null,
            Self::Descend(conversion) => conversion.to_value(),
            Self::DescendEach(conversions) => {
                Value::Array(conversions.iter().map(Conversion::to_value).collect())
            }
        }
    }
}

/// Declarative description of how to reshape one level of a document.
///
/// Keys are the document keys at this level; entries are applied in key
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversion {
    entries: BTreeMap<String, ConversionNode>,
}

impl Conversion {
    /// Create an empty conversion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename `old_key` to `new_key` at this level.
    pub fn rename(mut self, old_key: impl Into<String>, new_key: impl Into<String>) -> Self {
        self.entries
            .insert(old_key.into(), ConversionNode::Rename(new_key.into()));
        self
    }

    /// Mark `key` for enclosure at this level.
    pub fn enclose(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), ConversionNode::Enclose);
        self
    }

    /// Apply `child` to the map found at `key`.
    pub fn descend(mut self, key: impl Into<String>, child: Conversion) -> Self {
        self.entries
            .insert(key.into(), ConversionNode::Descend(child));
        self
    }

    /// Apply every conversion in `children` to every item of the list at `key`.
    pub fn each(mut self, key: impl Into<String>, children: Vec<Conversion>) -> Self {
        self.entries
            .insert(key.into(), ConversionNode::DescendEach(children));
        self
    }

    /// Iterate over entries in application order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ConversionNode)> {
        self.entries.iter().map(|(key, node)| (key.as_str(), node))
    }

    /// Look up the entry for a key.
    pub fn get(&self, key: &str) -> Option<&ConversionNode> {
        self.entries.get(key)
    }

    /// Number of entries at this level.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if this level has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a conversion from its JSON form.
    ///
    /// # Errors
    /// - The value is not an object
    /// - Any nested node is not a string, null, object or array of objects
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::Descriptor(format!("expected object, got {}", value))
        })?;

        let mut entries = BTreeMap::new();
        for (key, node) in object {
            entries.insert(key.clone(), ConversionNode::from_value(node)?);
        }
        Ok(Self { entries })
    }

    /// Parse a conversion from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::Descriptor(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Render the conversion back to its JSON form.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        for (key, node) in &self.entries {
            object.insert(key.clone(), node.to_value());
        }
        Value::Object(object)
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

//! In-place key renaming and map enclosure.

use serde_json::{Map, Value};
use tracing::trace;

use crate::conversion::{Conversion, ConversionNode};
use bwbridge_common::{Error, Result};

/// Which leaf kind a walk acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    Rename,
    Enclose,
}

/// Rename keys in `document` as described by `conversion`.
///
/// Old keys that are absent are skipped. An existing value at the new key is
/// overwritten.
///
/// # Errors
/// - Descriptor and document shapes disagree
/// - The descriptor contains an enclosure marker
pub fn transform_keys(document: &mut Value, conversion: &Conversion) -> Result<()> {
    walk_root(document, conversion, Walk::Rename)
}

/// Wrap the maps marked in `conversion` into one-element lists.
///
/// Absent and null targets are left alone.
///
/// # Errors
/// - A marked key holds something other than a map (including a list that
///   was already enclosed)
/// - Descriptor and document shapes disagree
/// - The descriptor contains a rename leaf
pub fn enclose(document: &mut Value, conversion: &Conversion) -> Result<()> {
    walk_root(document, conversion, Walk::Enclose)
}

fn walk_root(document: &mut Value, conversion: &Conversion, mode: Walk) -> Result<()> {
    if conversion.is_empty() {
        return Ok(());
    }
    match document {
        Value::Object(map) => walk(map, conversion, mode),
        Value::Null => Ok(()),
        other => Err(Error::StructuralMismatch {
            key: "<root>".to_string(),
            expected: "map",
            descriptor: conversion.to_string(),
            document: other.to_string(),
        }),
    }
}

fn walk(map: &mut Map<String, Value>, conversion: &Conversion, mode: Walk) -> Result<()> {
    for (key, node) in conversion.entries() {
        match node {
            ConversionNode::Rename(new_key) => {
                if mode != Walk::Rename {
                    return Err(Error::Descriptor(format!(
                        "rename '{}' -> '{}' in an enclosure descriptor",
                        key, new_key
                    )));
                }
                rename_key(map, key, new_key);
            }
            ConversionNode::Enclose => {
                if mode != Walk::Enclose {
                    return Err(Error::Descriptor(format!(
                        "enclosure marker '{}' in a rename descriptor",
                        key
                    )));
                }
                enclose_key(map, key)?;
            }
            ConversionNode::Descend(child) => match map.get_mut(key) {
                None | Some(Value::Null) => {}
                Some(Value::Object(inner)) => walk(inner, child, mode)?,
                Some(other) => return Err(mismatch(key, "map", node, other)),
            },
            ConversionNode::DescendEach(children) => match map.get_mut(key) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => {
                    for item in items.iter_mut() {
                        match item {
                            Value::Object(inner) => {
                                for child in children {
                                    walk(inner, child, mode)?;
                                }
                            }
                            other => return Err(mismatch(key, "list of maps", node, other)),
                        }
                    }
                }
                Some(other) => return Err(mismatch(key, "list", node, other)),
            },
        }
    }
    Ok(())
}

fn rename_key(map: &mut Map<String, Value>, old_key: &str, new_key: &str) {
    if let Some(value) = map.remove(old_key) {
        trace!(old_key, new_key, "renaming key");
        map.insert(new_key.to_string(), value);
    }
}

fn enclose_key(map: &mut Map<String, Value>, key: &str) -> Result<()> {
    match map.get_mut(key) {
        None | Some(Value::Null) => Ok(()),
        Some(value) if value.is_object() => {
            let inner = value.take();
            *value = Value::Array(vec![inner]);
            Ok(())
        }
        Some(other) => Err(Error::NotEnclosable {
            key: key.to_string(),
            document: other.to_string(),
        }),
    }
}

fn mismatch(key: &str, expected: &'static str, node: &ConversionNode, found: &Value) -> Error {
    Error::StructuralMismatch {
        key: key.to_string(),
        expected,
        descriptor: node.to_value().to_string(),
        document: found.to_string(),
    }
}

//! Accessors for the `name value` child-node convention used throughout
//! the configuration document.

use anyhow::Result;
use kdl::{KdlNode, KdlValue};

/// First positional argument of a node
fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}

/// Child node by name
fn child<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()?.get(name)
}

/// First argument of a node as a string, e.g. the ID in `listener "http" { ... }`
pub fn get_first_arg_string(node: &KdlNode) -> Option<String> {
    first_arg(node)?.as_string().map(str::to_string)
}

/// String value of a child node, e.g. `email "admin@example.com"`
pub fn get_string_entry(node: &KdlNode, name: &str) -> Option<String> {
    child(node, name).and_then(get_first_arg_string)
}

/// Integer value of a child node, e.g. `renew-before-days 30`
pub fn get_int_entry(node: &KdlNode, name: &str) -> Option<i64> {
    let value = first_arg(child(node, name)?)?.as_integer()?;
    i64::try_from(value).ok()
}

/// Boolean value of a child node, e.g. `staging true`
pub fn get_bool_entry(node: &KdlNode, name: &str) -> Option<bool> {
    first_arg(child(node, name)?)?.as_bool()
}

/// All string arguments of a child node, e.g. `domains "a.com" "b.com"`
pub fn get_string_list(node: &KdlNode, name: &str) -> Vec<String> {
    child(node, name)
        .map(|n| {
            n.entries()
                .iter()
                .filter(|entry| entry.name().is_none())
                .filter_map(|entry| entry.value().as_string().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// String value that must be present
pub fn require_string_entry(node: &KdlNode, name: &str, example: &str) -> Result<String> {
    get_string_entry(node, name).ok_or_else(|| {
        anyhow::anyhow!(
            "'{}' block requires a '{}' field, e.g., {} {}",
            node.name().value(),
            name,
            name,
            example
        )
    })
}

/// Non-negative integer value, rejecting negative numbers instead of wrapping
pub fn get_u64_entry(node: &KdlNode, name: &str) -> Result<Option<u64>> {
    match get_int_entry(node, name) {
        None => Ok(None),
        Some(v) => u64::try_from(v).map(Some).map_err(|_| {
            anyhow::anyhow!(
                "'{}' in '{}' must not be negative (got {})",
                name,
                node.name().value(),
                v
            )
        }),
    }
}

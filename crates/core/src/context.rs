//! Expansion context: the nested mapping placeholders are resolved against
//!
//! Contexts are layered: files are deep-merged in order, then `path=value`
//! overrides are applied on top.

use crate::error::{Error, Result};
use crate::placeholder::PlaceholderPath;
use serde_json::{Map, Value};
use std::path::Path;

/// Nested key-value data supplied by the orchestrator
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    root: Map<String, Value>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON value, which must be an object
    pub fn from_value(name: &str, value: Value) -> Result<Self> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            Value::Null => Ok(Self::new()),
            other => Err(Error::invalid_context(
                name,
                format!("expected a mapping at the root, found {}", kind(&other)),
            )),
        }
    }

    /// Parse a YAML (or JSON) context document
    pub fn from_yaml_str(name: &str, text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let document: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| Error::malformed(name, text, &e))?;
        let value: Value = serde_yaml::from_value(document)
            .map_err(|e| Error::invalid_context(name, e.to_string()))?;
        Self::from_value(name, value)
    }

    /// Read and parse a context file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, path, "read context"))?;
        Self::from_yaml_str(&path.display().to_string(), &text)
    }

    /// Deep-merge `other` on top of this context
    pub fn merge(&mut self, other: Self) {
        for (key, value) in other.root {
            match self.root.get_mut(&key) {
                Some(existing) => merge_value(existing, value),
                None => {
                    self.root.insert(key, value);
                }
            }
        }
    }

    /// Set a string value at a dotted path, creating intermediate mappings.
    ///
    /// Index segments step into sequences already in the context; an index
    /// past the end of one, or a key on a sequence, is rejected.
    pub fn set(&mut self, path: &PlaceholderPath, value: impl Into<String>) -> Result<()> {
        self.place(path, value.into())
            .map_err(|reason| Error::invalid_override(path.to_string(), reason))
    }

    /// Apply a `path=value` override as given on the command line
    pub fn apply_override(&mut self, argument: &str) -> Result<()> {
        let Some((path, value)) = argument.split_once('=') else {
            return Err(Error::invalid_override(argument, "missing `=`"));
        };
        let path = PlaceholderPath::parse(path.trim())
            .map_err(|e| Error::invalid_override(argument, e.to_string()))?;
        self.place(&path, value.to_string())
            .map_err(|reason| Error::invalid_override(argument, reason))
    }

    fn place(&mut self, path: &PlaceholderPath, value: String) -> std::result::Result<(), String> {
        let Some((first, rest)) = path.segments().split_first() else {
            return Ok(());
        };
        if let Some(slot) = self.root.get_mut(first) {
            return place_in(slot, rest, value);
        }
        let mut fresh = Value::Null;
        place_in(&mut fresh, rest, value)?;
        self.root.insert(first.clone(), fresh);
        Ok(())
    }

    /// Insert a whole value under a top-level key, replacing what was there
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    /// Look up the value at a dotted path
    pub fn lookup(&self, path: &PlaceholderPath) -> Option<&Value> {
        let (first, rest) = path.segments().split_first()?;
        lookup_in(self.root.get(first)?, rest)
    }

    /// Look up a path and render the value as substitution text.
    ///
    /// `null` and missing values both resolve to `None`.
    pub fn resolve(&self, path: &PlaceholderPath) -> Option<String> {
        match self.lookup(path)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            compound @ (Value::Array(_) | Value::Object(_)) => serde_json::to_string(compound).ok(),
        }
    }

    /// Whether the context holds no keys
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// The context as a JSON value
    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }
}

fn lookup_in<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value);
    };
    let next = match value {
        Value::Object(map) => map.get(head)?,
        Value::Array(items) => items.get(head.parse::<usize>().ok()?)?,
        _ => return None,
    };
    lookup_in(next, rest)
}

fn place_in(node: &mut Value, segments: &[String], value: String) -> std::result::Result<(), String> {
    let Some((head, rest)) = segments.split_first() else {
        *node = Value::String(value);
        return Ok(());
    };
    if let Value::Array(items) = node {
        let len = items.len();
        let slot = head
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get_mut(index))
            .ok_or_else(|| format!("`{head}` is not an index into a sequence of {len} items"))?;
        return place_in(slot, rest, value);
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return Ok(());
    };
    place_in(
        map.entry(head.clone()).or_insert(Value::Null),
        rest,
        value,
    )
}

fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

//! Community configuration documents and dot-path field resolution.
//!
//! A community configuration is an arbitrary JSON tree. Mutation only ever
//! happens at one leaf, addressed by a `.`-delimited path such as
//! `domainExpertise.mission`. There is no escaping: keys containing a literal
//! `.` cannot be addressed.

use std::collections::VecDeque;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Shape of a JSON value, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved configuration field, classified by the shapes the applier
/// knows how to handle.
#[derive(Debug)]
pub enum ConfigField<'a> {
    /// Free-form prompt text
    Text(&'a mut String),
    /// Ordered list, e.g. per-mode instructions
    Sequence(&'a mut Vec<Value>),
    /// Nested section of the configuration
    Mapping(&'a mut Map<String, Value>),
    /// Number, boolean or null
    Scalar(ValueKind),
}

impl<'a> ConfigField<'a> {
    pub fn classify(value: &'a mut Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::Sequence(items),
            Value::Object(map) => Self::Mapping(map),
            other => Self::Scalar(ValueKind::of(other)),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::String,
            Self::Sequence(_) => ValueKind::Array,
            Self::Mapping(_) => ValueKind::Object,
            Self::Scalar(kind) => *kind,
        }
    }

    /// Append `addition` without discarding existing content.
    ///
    /// Text is trimmed and joined to the addition by a blank line; sequences
    /// gain one trailing element. Any other shape is returned as the error.
    pub fn append(self, addition: &str) -> Result<(), ValueKind> {
        match self {
            Self::Text(text) => {
                let merged = format!("{}\n\n{}", text.trim(), addition);
                *text = merged;
                Ok(())
            }
            Self::Sequence(items) => {
                items.push(Value::String(addition.to_string()));
                Ok(())
            }
            Self::Mapping(_) => Err(ValueKind::Object),
            Self::Scalar(kind) => Err(kind),
        }
    }
}

/// A parsed `.`-delimited field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a section path. Returns `None` for an empty path or one with
    /// empty segments (`a..b`, `.a`).
    pub fn parse(section: &str) -> Option<Self> {
        let segments: Vec<String> = section.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        Some(Self {
            raw: section.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment, the key being mutated.
    pub fn leaf(&self) -> &str {
        // parse() guarantees at least one segment
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The first `len` segments joined back together.
    pub fn prefix(&self, len: usize) -> String {
        self.segments[..len.min(self.segments.len())].join(".")
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A field path that does not resolve in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedPath {
    /// First prefix of the path that could not be resolved
    pub missing: String,
    /// Another location in the document holding a key with the same name
    /// as the path's leaf
    pub suggestion: Option<String>,
}

/// One community's configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityDocument {
    root: Value,
}

impl CommunityDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self {
            root: serde_json::from_slice(bytes)?,
        })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Look up a field without mutating.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path.segments()
            .iter()
            .try_fold(&self.root, |current, segment| step(current, segment))
    }

    /// Resolve `path` to a mutable, classified field.
    ///
    /// Walks segment by segment from the root. On failure the error names the
    /// first unresolvable prefix and, when the leaf key exists elsewhere in
    /// the tree, the shallowest such location.
    pub fn field_mut(&mut self, path: &FieldPath) -> Result<ConfigField<'_>, UnresolvedPath> {
        if let Some(depth) = unresolved_depth(&self.root, path) {
            return Err(UnresolvedPath {
                missing: path.prefix(depth + 1),
                suggestion: self.find_key(path.leaf()),
            });
        }

        let mut current = &mut self.root;
        for (depth, segment) in path.segments().iter().enumerate() {
            current = step_mut(current, segment).ok_or_else(|| UnresolvedPath {
                missing: path.prefix(depth + 1),
                suggestion: None,
            })?;
        }

        Ok(ConfigField::classify(current))
    }

    /// Breadth-first search for an object key named `key`, returning its
    /// dotted path. Only objects are descended into.
    pub fn find_key(&self, key: &str) -> Option<String> {
        let mut queue: VecDeque<(String, &Value)> = VecDeque::new();
        queue.push_back((String::new(), &self.root));

        while let Some((prefix, value)) = queue.pop_front() {
            let Value::Object(map) = value else {
                continue;
            };

            for (name, child) in map {
                let child_path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };

                if name == key {
                    return Some(child_path);
                }
                queue.push_back((child_path, child));
            }
        }

        None
    }

    /// Serialize with two-space indentation and a trailing newline.
    pub fn to_pretty_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(&self.root)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Serialize and confirm the bytes parse back to the same tree.
    pub fn serialize_verified(&self) -> Result<Vec<u8>, String> {
        let bytes = self.to_pretty_bytes().map_err(|e| e.to_string())?;
        let reparsed: Value = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
        if reparsed != self.root {
            return Err("serialized document does not round-trip".to_string());
        }
        Ok(bytes)
    }
}

/// SHA256 of document bytes, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn step<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn step_mut<'v>(value: &'v mut Value, segment: &str) -> Option<&'v mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

/// Index of the first segment that fails to resolve, if any.
fn unresolved_depth(root: &Value, path: &FieldPath) -> Option<usize> {
    let mut current = root;
    for (depth, segment) in path.segments().iter().enumerate() {
        match step(current, segment) {
            Some(next) => current = next,
            None => return Some(depth),
        }
    }
    None
}

//! Request descriptors.
//!
//! A [`Params`] value identifies one requested transformation: the source, the
//! processing options and the output format. It maps string keys to typed
//! [`Value`]s, which may themselves be nested descriptors.
//!
//! ## Canonical form
//!
//! [`Params`]'s `Display` renders keys in sorted order, recursing into
//! nested descriptors:
//!
//! ```text
//! map[format:png resize:map[height:50 width:100] source:a.jpg]
//! ```
//!
//! This string is the input of cache-key hashing, and two descriptors are
//! equal iff their canonical strings are equal. Keys are stored sorted, so the
//! rendering never depends on insertion order.
//!
//! ## Building descriptors
//!
//! Descriptors are usually built by a front end (an HTTP query parser, the
//! CLI) and are read-only once handed to a server. [`Params::parse_pair`] is
//! the small `key=value` grammar the CLI uses; dotted keys build nested
//! descriptors.

use crate::error::ParamError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Params(Params),
}

impl Value {
    /// Runtime type name, used in wrong-type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Params(_) => "params",
        }
    }

    /// Sniff a textual value: bool, then int, then finite float, else string.
    pub fn parse(text: &str) -> Self {
        match text {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = text.parse::<f64>()
            && f.is_finite()
        {
            return Value::Float(f);
        }
        Value::String(text.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Params(p) => write!(f, "{p}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Params> for Value {
    fn from(p: Params) -> Self {
        Value::Params(p)
    }
}

/// A request descriptor: string keys to typed values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn get(&self, key: &str) -> Result<&Value, ParamError> {
        self.values.get(key).ok_or_else(|| ParamError::not_set(key))
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_string(&self, key: &str) -> Result<&str, ParamError> {
        match self.get(key)? {
            Value::String(s) => Ok(s),
            other => Err(ParamError::wrong_type(key, other.type_name(), "string")),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64, ParamError> {
        match self.get(key)? {
            Value::Int(i) => Ok(*i),
            other => Err(ParamError::wrong_type(key, other.type_name(), "int")),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<f64, ParamError> {
        match self.get(key)? {
            Value::Float(x) => Ok(*x),
            other => Err(ParamError::wrong_type(key, other.type_name(), "float")),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ParamError> {
        match self.get(key)? {
            Value::Bool(b) => Ok(*b),
            other => Err(ParamError::wrong_type(key, other.type_name(), "bool")),
        }
    }

    pub fn get_params(&self, key: &str) -> Result<&Params, ParamError> {
        match self.get(key)? {
            Value::Params(p) => Ok(p),
            other => Err(ParamError::wrong_type(key, other.type_name(), "params")),
        }
    }

    /// An int that must fit in `u32`.
    pub fn get_u32(&self, key: &str) -> Result<u32, ParamError> {
        let i = self.get_int(key)?;
        u32::try_from(i).map_err(|_| ParamError::invalid(key, format!("{i} is out of range")))
    }

    /// Set a value at a dotted path, creating nested descriptors as needed.
    ///
    /// Fails if an intermediate segment already holds a non-descriptor value.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), ParamError> {
        match path.split_once('.') {
            None => {
                if path.is_empty() {
                    return Err(ParamError::invalid(path, "empty key"));
                }
                self.set(path, value);
                Ok(())
            }
            Some((head, rest)) => {
                if head.is_empty() {
                    return Err(ParamError::invalid(path, "empty key"));
                }
                let child = self
                    .values
                    .entry(head.to_string())
                    .or_insert_with(|| Value::Params(Params::new()));
                match child {
                    Value::Params(nested) => nested
                        .set_path(rest, value)
                        .map_err(|e| e.with_prefix(head)),
                    other => Err(ParamError::wrong_type(head, other.type_name(), "params")),
                }
            }
        }
    }

    /// Parse and apply one `key=value` pair (`resize.width=100`).
    pub fn parse_pair(&mut self, pair: &str) -> Result<(), ParamError> {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| ParamError::invalid(pair, "expected key=value"))?;
        self.set_path(key.trim(), Value::parse(raw.trim()))
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("map[")?;
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}:{value}")?;
        }
        f.write_str("]")
    }
}

/// Equality is equality of the canonical form, so `Int(2)` and `Float(2.0)`
/// under the same key compare equal, exactly as their cache keys do.
impl PartialEq for Params {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.to_string() == other.to_string()
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

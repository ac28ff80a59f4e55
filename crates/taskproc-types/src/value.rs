use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A dynamically-typed value flowing through a channel.
///
/// The distilled spec models input/output values as whatever the script
/// language's dynamic type system produces; here that is replaced by an
/// explicit tagged enum, matched on by the staging and hashing code
/// instead of downcasting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Path(Utf8PathBuf),
    Str(String),
    Num(f64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// The sentinel bound to an optional output whose files did not
    /// appear, or to a "default" output kind.
    Missing,
}

impl Value {
    pub fn is_path_like(&self) -> bool {
        matches!(self, Value::Path(_))
    }

    /// Render a non-path value as its fingerprint/staging content. Paths
    /// are not stringified this way; they are staged as actual files.
    pub fn literal_content(&self) -> String {
        match self {
            Value::Path(p) => p.to_string(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format!("{n}"),
            Value::Bool(b) => format!("{b}"),
            Value::List(items) => {
                let parts: Vec<_> = items.iter().map(Value::literal_content).collect();
                format!("[{}]", parts.join(","))
            }
            Value::Map(map) => {
                let parts: Vec<_> = map
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.literal_content()))
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
            Value::Missing => String::new(),
        }
    }

    /// Lift a single value into a `Vec<Value>`, flattening an existing
    /// list rather than nesting it. Used by input staging pass 2 before
    /// wildcard expansion, per the "a single value is lifted to a
    /// 1-element collection" normalization rule.
    pub fn into_collection(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            other => vec![other],
        }
    }
}

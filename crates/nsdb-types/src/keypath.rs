//! Key-path extraction and total-order-preserving serialization.
//!
//! A [`KeyPath`] names where a key lives inside a stored item: either a
//! single dotted path (`"user.id"`) or an ordered sequence of paths for a
//! compound key (`["a", "b"]`). [`KeyPath::extract`] reads the value(s) out
//! of a [`serde_json::Value`]; [`KeyPath::serialize`] turns the extracted
//! value(s) into a string whose lexicographic order matches the original
//! value's order, so the string can be used directly as a SQL `TEXT` column
//! or an index key.

use serde_json::Value;
use std::fmt;

/// Separates the components of a compound key once serialized.
///
/// Chosen as the ASCII Unit Separator (0x1F): it cannot appear in the
/// rendered text of a JSON string once control characters are escaped, so it
/// can never be mistaken for a component boundary.
const COMPOUND_SEP: char = '\u{1f}';

/// Names where a key lives inside an item: a single dotted path, or an
/// ordered sequence of paths for a compound key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    Single(String),
    Compound(Vec<String>),
}

impl KeyPath {
    pub fn single(path: impl Into<String>) -> Self {
        KeyPath::Single(path.into())
    }

    pub fn compound(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        KeyPath::Compound(paths.into_iter().map(Into::into).collect())
    }

    /// `true` if this key-path names more than one component.
    pub fn is_compound(&self) -> bool {
        matches!(self, KeyPath::Compound(_))
    }

    /// The dotted paths making up this key, in order.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            KeyPath::Single(p) => vec![p.as_str()],
            KeyPath::Compound(ps) => ps.iter().map(String::as_str).collect(),
        }
    }

    /// Extracts the value(s) this key-path names out of `item`.
    ///
    /// Returns `None` for a component whose path is missing any
    /// intermediate segment (e.g. `a.b.c` where `a.b` is not an object).
    pub fn extract<'a>(&self, item: &'a Value) -> Vec<Option<&'a Value>> {
        self.paths()
            .into_iter()
            .map(|p| extract_single(item, p))
            .collect()
    }

    /// Extracts and serializes the key in one step.
    pub fn extract_and_serialize(&self, item: &Value) -> Result<String, KeyPathError> {
        let extracted = self.extract(item);
        serialize_components(&extracted, self)
    }

    /// Serializes a single value against this key-path (must be
    /// [`KeyPath::Single`]) or a slice of values against a compound path.
    pub fn serialize_values(&self, values: &[Value]) -> Result<String, KeyPathError> {
        let refs: Vec<Option<&Value>> = values.iter().map(Some).collect();
        serialize_components(&refs, self)
    }

    /// Normalizes a single key or an array of keys into a list of
    /// serialized-string keys, failing if any element cannot be serialized.
    pub fn list_of_keys(&self, keys: &Value) -> Result<Vec<String>, KeyPathError> {
        match keys {
            Value::Array(arr) if self.is_compound() => {
                // A compound key-path's own key value IS an array (one
                // element per component) -- a bare array here means "one
                // compound key", not "many single keys".
                self.serialize_values(arr)
                    .map(|s| vec![s])
            }
            Value::Array(arr) => arr
                .iter()
                .map(|v| self.serialize_values(std::slice::from_ref(v)))
                .collect(),
            other => self.serialize_values(std::slice::from_ref(other)).map(|s| vec![s]),
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.paths().join("."))
    }
}

fn extract_single<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn serialize_components(
    components: &[Option<&Value>],
    key_path: &KeyPath,
) -> Result<String, KeyPathError> {
    let mut parts = Vec::with_capacity(components.len());
    for (value, path) in components.iter().zip(key_path.paths()) {
        let value = value.ok_or_else(|| KeyPathError::Missing(path.to_string()))?;
        parts.push(serialize_component(value, path)?);
    }
    Ok(parts.join(&COMPOUND_SEP.to_string()))
}

/// Serializes one key component so that string-lexicographic order of the
/// result matches the natural order of the underlying value.
fn serialize_component(value: &Value, path: &str) -> Result<String, KeyPathError> {
    match value {
        Value::String(s) => {
            if s.contains(COMPOUND_SEP) {
                return Err(KeyPathError::Unserializable(path.to_string()));
            }
            // Tag strings so they never collide with a number's tag below.
            Ok(format!("s{s}"))
        }
        Value::Number(n) => {
            let f = n
                .as_f64()
                .ok_or_else(|| KeyPathError::Unserializable(path.to_string()))?;
            Ok(format!("n{}", encode_ordered_f64(f)))
        }
        Value::Bool(b) => Ok(format!("n{}", encode_ordered_f64(if *b { 1.0 } else { 0.0 }))),
        _ => Err(KeyPathError::Unserializable(path.to_string())),
    }
}

/// Encodes an `f64` (including dates serialized as epoch-millis numbers) as
/// a fixed-width decimal string such that ASCII-lexicographic order of the
/// encoding matches numeric order across the whole `f64` range.
///
/// The scheme: shift every value into the non-negative range by adding a
/// bias, then zero-pad to a fixed width. The sign digit (`0` negative, `1`
/// non-negative) ensures negatives always sort before positives.
fn encode_ordered_f64(f: f64) -> String {
    const BIAS: f64 = 1e15;
    const WIDTH: usize = 20;
    let sign = if f < 0.0 { '0' } else { '1' };
    let shifted = f + BIAS;
    format!("{sign}{:0width$.6}", shifted.max(0.0), width = WIDTH)
}

/// Errors raised while extracting or serializing a key-path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyPathError {
    #[error("key component at path {0:?} is missing")]
    Missing(String),

    #[error("value at path {0:?} cannot be serialized as a key (must be string, number, or bool)")]
    Unserializable(String),
}

/// A node in a JSON document tree.
///
/// Objects are stored as an ordered list of key/value pairs. Duplicate keys
/// are representable (the wire format allows them); lookups return the first
/// match. Every node exclusively owns its children, so [`Clone`] is a deep
/// copy and dropping a tree frees exactly that tree.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Creates an empty object.
    pub fn object() -> Value {
        Value::Object(Vec::new())
    }

    /// Creates an empty array.
    pub fn array() -> Value {
        Value::Array(Vec::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value saturated to the `i64` range (NaN maps to 0).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Object(members) => Some(members),
            _ => None,
        }
    }

    /// Number of items in an array or members in an object; 0 otherwise.
    pub fn len(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            Value::Object(members) => members.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First member with the given key, or `None` for a missing key or a
    /// non-object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(members) => members.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Object(members) => members
                .iter_mut()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// True when the key is present, whatever its value.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// String field sentinel accessor: `""` when missing or not a string.
    pub fn string(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// Numeric field sentinel accessor: `0.0` when missing or not a number.
    pub fn number(&self, key: &str) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Integer field sentinel accessor: `0` when missing or not a number,
    /// saturated to the `i64` range.
    pub fn int(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    /// Boolean field sentinel accessor: `false` when missing or not a bool.
    pub fn boolean(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// True when the string field is absent or empty. An absent or empty
    /// `err` field is how a response signals success.
    pub fn is_null_string(&self, key: &str) -> bool {
        self.string(key).is_empty()
    }

    /// True when the string field contains the given fragment. Used for
    /// `{io}`-tag error classification.
    pub fn contains_string(&self, key: &str, fragment: &str) -> bool {
        self.string(key).contains(fragment)
    }

    /// Appends a member to an object. No-op on non-objects, so request
    /// construction never panics on a mistyped node.
    pub fn add(&mut self, key: &str, value: impl Into<Value>) {
        if let Value::Object(members) = self {
            members.push((key.to_string(), value.into()));
        }
    }

    /// Replaces the first member with the given key, or appends when absent.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        if let Some(slot) = self.get_mut(key) {
            *slot = value.into();
        } else {
            self.add(key, value);
        }
    }

    /// Replaces the first member with the given key. Returns false when the
    /// key is absent (nothing is inserted).
    pub fn replace(&mut self, key: &str, value: impl Into<Value>) -> bool {
        match self.get_mut(key) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Removes and returns the first member with the given key.
    pub fn detach(&mut self, key: &str) -> Option<Value> {
        if let Value::Object(members) = self {
            let index = members.iter().position(|(k, _)| k == key)?;
            return Some(members.remove(index).1);
        }
        None
    }

    /// Removes the first member with the given key.
    pub fn remove(&mut self, key: &str) -> bool {
        self.detach(key).is_some()
    }

    /// Appends an item to an array. No-op on non-arrays.
    pub fn push(&mut self, value: impl Into<Value>) {
        if let Value::Array(items) = self {
            items.push(value.into());
        }
    }

    /// Array item by index, or `None` out of range / non-array.
    pub fn at(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Array(items) => items.get(index),
            _ => None,
        }
    }

    /// Copies this node. When `recurse` is false, container children are not
    /// copied and the result is an empty object/array; siblings of the root
    /// are never part of the copy.
    pub fn duplicate(&self, recurse: bool) -> Value {
        if recurse {
            return self.clone();
        }
        match self {
            Value::Array(_) => Value::array(),
            Value::Object(_) => Value::object(),
            other => other.clone(),
        }
    }

    /// Structural equality. Array items must match in order; object members
    /// match by key irrespective of order, via a bidirectional membership
    /// test (quadratic, acceptable for the small documents this protocol
    /// produces). `case_sensitive` governs object key matching only.
    pub fn compare(&self, other: &Value, case_sensitive: bool) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.compare(y, case_sensitive))
            }
            (Value::Object(a), Value::Object(b)) => {
                subset(a, b, case_sensitive) && subset(b, a, case_sensitive)
            }
            _ => false,
        }
    }
}

fn key_matches(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

fn subset(a: &[(String, Value)], b: &[(String, Value)], case_sensitive: bool) -> bool {
    a.iter().all(|(key, value)| {
        b.iter()
            .any(|(k, v)| key_matches(key, k, case_sensitive) && value.compare(v, case_sensitive))
    })
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.compare(other, true)
    }
}

impl Default for Value {
    fn default() -> Value {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Number(v as f64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(v)
    }
}

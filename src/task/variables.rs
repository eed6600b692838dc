//! Per-case variable namespace
//!
//! Three tables keyed by name: buffers, scalar values, and integer loop
//! indices. Buffer and value keys may reference indices as `$name`, which is
//! replaced by the index's decimal value before the table is touched.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::audio::SharedBuffer;

/// Scalar passed between process steps
#[derive(Debug, Clone, Copy)]
pub enum Value {
    Double(f64),
    Int(i64),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Double(v) => v,
            Value::Int(v) => v as f64,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Value::Double(v) => v as i64,
            Value::Int(v) => v,
        }
    }
}

/// Tags must match and the bit patterns must be identical
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Int(a), Value::Int(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
        }
    }
}

/// Name → value table with insert-only `register` and replace-only `update`
#[derive(Debug, Clone)]
pub struct VarTable<T> {
    entries: BTreeMap<String, T>,
}

impl<T> Default for VarTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Clone> VarTable<T> {
    /// Insert a new entry; fails if `name` already exists
    pub fn register(&mut self, name: &str, value: T) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name.to_string(), value);
        true
    }

    /// Replace an existing entry; fails if `name` is absent
    pub fn update(&mut self, name: &str, value: T) -> bool {
        match self.entries.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn find(&self, name: &str) -> Option<T> {
        self.entries.get(name).cloned()
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.entries.remove(name)
    }

    /// Entries whose name matches `pattern` anywhere, in name order
    pub fn find_all(&self, pattern: &Regex) -> Vec<(String, T)> {
        self.entries
            .iter()
            .filter(|(name, _)| pattern.is_match(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three tables owned by a case
#[derive(Debug, Default, Clone)]
pub struct CaseVariables {
    buffers: VarTable<SharedBuffer>,
    values: VarTable<Value>,
    indices: VarTable<i64>,
}

impl CaseVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every `$name` with the value of index `name`
    ///
    /// A name is the longest run of ASCII alphanumerics after `$`. Returns
    /// `None` if any referenced index is undefined.
    pub fn translate_var_name(&self, name: &str) -> Option<String> {
        if !name.contains('$') {
            return Some(name.to_string());
        }
        let mut out = String::with_capacity(name.len());
        let mut rest = name;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let end = after
                .find(|c: char| !c.is_ascii_alphanumeric())
                .unwrap_or(after.len());
            let index = &after[..end];
            if index.is_empty() {
                return None;
            }
            out.push_str(&self.indices.find(index)?.to_string());
            rest = &after[end..];
        }
        out.push_str(rest);
        Some(out)
    }

    pub fn register_buffer(&mut self, name: &str, buffer: SharedBuffer) -> bool {
        match self.translate_var_name(name) {
            Some(key) => self.buffers.register(&key, buffer),
            None => false,
        }
    }

    pub fn update_buffer(&mut self, name: &str, buffer: SharedBuffer) -> bool {
        match self.translate_var_name(name) {
            Some(key) => self.buffers.update(&key, buffer),
            None => false,
        }
    }

    /// Register, or replace if already present
    pub fn set_buffer(&mut self, name: &str, buffer: SharedBuffer) -> bool {
        self.update_buffer(name, buffer.clone()) || self.register_buffer(name, buffer)
    }

    pub fn find_buffer(&self, name: &str) -> Option<SharedBuffer> {
        self.buffers.find(&self.translate_var_name(name)?)
    }

    pub fn remove_buffer(&mut self, name: &str) -> Option<SharedBuffer> {
        let key = self.translate_var_name(name)?;
        self.buffers.remove(&key)
    }

    pub fn find_buffers(&self, pattern: &Regex) -> Vec<(String, SharedBuffer)> {
        self.buffers.find_all(pattern)
    }

    pub fn register_value(&mut self, name: &str, value: Value) -> bool {
        match self.translate_var_name(name) {
            Some(key) => self.values.register(&key, value),
            None => false,
        }
    }

    pub fn update_value(&mut self, name: &str, value: Value) -> bool {
        match self.translate_var_name(name) {
            Some(key) => self.values.update(&key, value),
            None => false,
        }
    }

    /// Register, or replace if already present
    pub fn set_value(&mut self, name: &str, value: Value) -> bool {
        self.update_value(name, value) || self.register_value(name, value)
    }

    pub fn find_value(&self, name: &str) -> Option<Value> {
        self.values.find(&self.translate_var_name(name)?)
    }

    pub fn find_values(&self, pattern: &Regex) -> Vec<(String, Value)> {
        self.values.find_all(pattern)
    }

    /// Index names are used verbatim, never translated
    pub fn register_index(&mut self, name: &str, value: i64) -> bool {
        self.indices.register(name, value)
    }

    pub fn update_index(&mut self, name: &str, value: i64) -> bool {
        self.indices.update(name, value)
    }

    pub fn set_index(&mut self, name: &str, value: i64) {
        if !self.indices.update(name, value) {
            self.indices.register(name, value);
        }
    }

    pub fn find_index(&self, name: &str) -> Option<i64> {
        self.indices.find(name)
    }

    pub fn find_indices(&self, pattern: &Regex) -> Vec<(String, i64)> {
        self.indices.find_all(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Buffer;

    #[test]
    fn test_translate_without_references() {
        let vars = CaseVariables::new();
        assert_eq!(vars.translate_var_name("plain_name").as_deref(), Some("plain_name"));
    }

    #[test]
    fn test_translate_multiple_indices() {
        let mut vars = CaseVariables::new();
        vars.register_index("i", 1);
        vars.register_index("j", 2);
        assert_eq!(
            vars.translate_var_name("hello_$i_$j").as_deref(),
            Some("hello_1_2")
        );
        assert_eq!(vars.translate_var_name("$i").as_deref(), Some("1"));
    }

    #[test]
    fn test_translate_undefined_index_fails() {
        let mut vars = CaseVariables::new();
        vars.register_index("i", 1);
        assert!(vars.translate_var_name("rec_$k").is_none());
        assert!(vars.translate_var_name("rec_$").is_none());
    }

    #[test]
    fn test_value_equality_compares_tags() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Double(3.0));
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
    }

    #[test]
    fn test_indexed_buffer_names() {
        let mut vars = CaseVariables::new();
        vars.register_index("i", 4);
        let buffer = Buffer::from_samples(&[1, 2], false).into_shared();

        assert!(vars.register_buffer("rec_$i", buffer.clone()));
        assert!(vars.find_buffer("rec_4").is_some());
        assert!(!vars.register_buffer("rec_$missing", buffer));
    }

    #[test]
    fn test_find_all_by_pattern() {
        let mut vars = CaseVariables::new();
        vars.register_value("rms_0", Value::Double(1.0));
        vars.register_value("rms_1", Value::Double(2.0));
        vars.register_value("peak", Value::Int(7));

        let re = Regex::new("^rms_[0-9]+$").unwrap();
        let found = vars.find_values(&re);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, "rms_0");

        let none = Regex::new("^nothing$").unwrap();
        assert!(vars.find_values(&none).is_empty());
    }
}

//! Restart-survivable execution context.
//!
//! An [`ExecutionContext`] is a string-keyed bag of primitive values
//! attached to a job or step execution. It is persisted after every
//! chunk commit and read back when the same (job, step) pair is
//! restarted, which is how partially completed work resumes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single context entry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// String-keyed bag of primitive values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext(BTreeMap<String, ContextValue>);

impl ExecutionContext {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn put_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), ContextValue::Str(value.into()));
    }

    pub fn put_int(&mut self, key: impl Into<String>, value: i64) {
        self.0.insert(key.into(), ContextValue::Int(value));
    }

    pub fn put_float(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), ContextValue::Float(value));
    }

    pub fn put_bool(&mut self, key: impl Into<String>, value: bool) {
        self.0.insert(key.into(), ContextValue::Bool(value));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.0.get(key)
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ContextValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(ContextValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(ContextValue::Float(f)) => Some(*f),
            Some(ContextValue::Int(i)) => {
                #[allow(clippy::cast_precision_loss)]
                Some(*i as f64)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(ContextValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every entry of `other` into this context, overwriting
    /// existing keys. Used to seed a restarted step with its prior
    /// persisted state.
    pub fn merge(&mut self, other: &ExecutionContext) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_put_and_get() {
        let mut ctx = ExecutionContext::new();
        ctx.put_string("partition.name", "partition0");
        ctx.put_int("range.start", 0);
        ctx.put_float("ratio", 0.5);
        ctx.put_bool("restarted", true);

        assert_eq!(ctx.get_string("partition.name"), Some("partition0"));
        assert_eq!(ctx.get_int("range.start"), Some(0));
        assert_eq!(ctx.get_float("ratio"), Some(0.5));
        assert_eq!(ctx.get_bool("restarted"), Some(true));
        assert_eq!(ctx.get_int("missing"), None);
    }

    #[test]
    fn get_with_wrong_type_is_none() {
        let mut ctx = ExecutionContext::new();
        ctx.put_string("count", "ten");
        assert_eq!(ctx.get_int("count"), None);
    }

    #[test]
    fn merge_overwrites_existing_keys() {
        let mut base = ExecutionContext::new();
        base.put_int("read.count", 10);
        base.put_string("keep", "yes");

        let mut prior = ExecutionContext::new();
        prior.put_int("read.count", 20);

        base.merge(&prior);
        assert_eq!(base.get_int("read.count"), Some(20));
        assert_eq!(base.get_string("keep"), Some("yes"));
    }

    #[test]
    fn serde_roundtrip_preserves_types() {
        let mut ctx = ExecutionContext::new();
        ctx.put_int("n", 7);
        ctx.put_string("s", "text");
        ctx.put_bool("b", false);

        let json = serde_json::to_string(&ctx).unwrap();
        let back: ExecutionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get_int("n"), Some(7));
        assert_eq!(back.get_string("s"), Some("text"));
        assert_eq!(back.get_bool("b"), Some(false));
    }
}

//! The state store threaded through every node of a run.
//!
//! Insertion-ordered; keys are added or overwritten, never removed.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use scrapegraph_shared::{Result, ScrapeGraphError};

/// Ordered key/value bag owned by a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    entries: IndexMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`. Existing keys keep their position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Serialize `value` and store it under `key`.
    pub fn insert_serialized<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| {
            ScrapeGraphError::parse(format!("cannot store state key '{key}': {e}"))
        })?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Builder-style [`State::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Deserialize the value under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent and a parse error when the
    /// stored value does not have the expected shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ScrapeGraphError::parse(format!("state key '{key}': {e}"))),
            None => Ok(None),
        }
    }

    /// Whether `key` is present with a non-null value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|v| !v.is_null())
    }

    /// Copy every entry of `other` into this state, overwriting on conflict.
    pub fn merge(&mut self, other: State) {
        self.entries.extend(other.entries);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.entries
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preserves_insertion_order() {
        let state = State::new()
            .with("user_prompt", "question")
            .with("json", "data.json")
            .with("doc", json!([]));
        let keys: Vec<&str> = state.keys().collect();
        assert_eq!(keys, ["user_prompt", "json", "doc"]);
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut state = State::new().with("a", 1).with("b", 2);
        state.insert("a", 3);
        let pairs: Vec<(&str, &Value)> = state.iter().collect();
        assert_eq!(pairs, [("a", &json!(3)), ("b", &json!(2))]);
    }

    #[test]
    fn null_values_do_not_count_as_present() {
        let state = State::new().with("answer", Value::Null).with("doc", "x");
        assert!(!state.contains("answer"));
        assert!(state.contains("doc"));
        assert!(!state.contains("missing"));
    }

    #[test]
    fn typed_access() {
        let mut state = State::new();
        state
            .insert_serialized("numbers", &vec![1u32, 2, 3])
            .expect("serialize");
        let numbers: Vec<u32> = state.get_as("numbers").expect("decode").expect("present");
        assert_eq!(numbers, [1, 2, 3]);

        let missing: Option<Vec<u32>> = state.get_as("other").expect("absent is ok");
        assert!(missing.is_none());

        let wrong: Result<Option<String>> = state.get_as("numbers");
        assert!(wrong.is_err());
    }

    #[test]
    fn merge_overwrites_and_appends() {
        let mut state = State::from_iter([("a", 1), ("b", 2)]);
        state.merge(State::from_iter([("b", 20), ("c", 30)]));
        assert_eq!(state.get("b"), Some(&json!(20)));
        assert_eq!(state.len(), 3);
        assert_eq!(state.get_str("a"), None);
    }

    #[test]
    fn serializes_as_plain_object() {
        let state = State::new().with("user_prompt", "q").with("json", "f.json");
        let value = serde_json::to_value(&state).expect("serialize");
        assert_eq!(value, json!({"user_prompt": "q", "json": "f.json"}));
    }
}

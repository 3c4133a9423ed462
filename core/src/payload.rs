//! Request payloads.
//!
//! A `Payload` is the set of parameters sent as the JSON body of an API
//! call. Absent fields are modelled as absent, never as `null`: setting a
//! field to `None` or to JSON null leaves it out of the serialized body.
//! Keys are kept sorted so the serialized form, and therefore the cache
//! digest, is stable.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{AkhetError, AkhetResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    fields: BTreeMap<String, Value>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`. A JSON null removes the field instead.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    /// Set `key` when `value` is `Some`; leave it unset otherwise.
    pub fn with_opt<V: Into<Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    /// Build a payload from any value that serializes to a JSON object.
    ///
    /// `None` fields (serialized as null) are dropped.
    pub fn from_serializable<T: Serialize>(value: &T) -> AkhetResult<Self> {
        match serde_json::to_value(value).map_err(|e| AkhetError::Serialization(e.to_string()))? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            Value::Null => Ok(Self::new()),
            other => Err(AkhetError::Serialization(format!(
                "payload must be a JSON object, got {other}"
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The request body: a JSON object of the set fields, `{}` when empty.
    pub fn to_json(&self) -> String {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
        .to_string()
    }

    /// Lowercase hex SHA-256 of `to_json()`.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.fields.remove(&key);
        } else {
            self.fields.insert(key, value);
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for (k, v) in iter {
            payload.insert(k, v);
        }
        payload
    }
}

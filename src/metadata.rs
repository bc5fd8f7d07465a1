// src/metadata.rs

//! Opaque document metadata: EXIF-like key/value pairs.
//!
//! The engine only stores and forwards these; interpretation belongs to
//! the application layer. The map is embedded in the document body as a
//! JSON blob, so keys and values are free-form strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A string key/value map carried alongside the pixel data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Discards this map's contents and copies `other`'s.
    pub fn replace_from(&mut self, other: &Metadata) {
        self.entries = other.entries.clone();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

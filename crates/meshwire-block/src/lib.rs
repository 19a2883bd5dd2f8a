//! Named map from string to serialized bytes, with a per-entry dirty flag.
//!
//! This is deliberately thin: no persistence, no typed codec, no schema.
//! Callers serialize their own payload before calling [`Block::set_blob`];
//! this crate only tracks which entries changed since the last
//! [`Block::take_dirty`].

use std::{collections::HashMap, sync::RwLock};

struct BlobEntry {
    bytes: Vec<u8>,
    dirty: bool,
}

/// A server- or client-owned collection of named byte blobs.
#[derive(Default)]
pub struct Block {
    entries: RwLock<HashMap<String, BlobEntry>>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `bytes` under `name` if the name is not already present.
    /// Returns `false` without modifying the entry if it already exists.
    pub fn insert_blob(&self, name: impl Into<String>, bytes: Vec<u8>) -> bool {
        let mut entries = self.entries.write().expect("block lock poisoned");
        let name = name.into();
        if entries.contains_key(&name) {
            return false;
        }
        entries.insert(name, BlobEntry { bytes, dirty: false });
        true
    }

    /// Returns a copy of the blob stored under `name`, if any.
    pub fn get_blob(&self, name: &str) -> Option<Vec<u8>> {
        self.entries.read().expect("block lock poisoned").get(name).map(|e| e.bytes.clone())
    }

    /// Overwrites (or creates) the blob under `name` and marks it dirty.
    pub fn set_blob(&self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        tracing::debug!(%name, len = bytes.len(), "blob set");
        let mut entries = self.entries.write().expect("block lock poisoned");
        entries.insert(name, BlobEntry { bytes, dirty: true });
    }

    /// Drains every dirty entry's current bytes, clearing the dirty flag on
    /// each, and returns them as `(name, bytes)` pairs. Entries that were
    /// never marked dirty are left untouched.
    pub fn take_dirty(&self) -> Vec<(String, Vec<u8>)> {
        let mut entries = self.entries.write().expect("block lock poisoned");
        let mut out = Vec::new();
        for (name, entry) in entries.iter_mut() {
            if entry.dirty {
                entry.dirty = false;
                out.push((name.clone(), entry.bytes.clone()));
            }
        }
        out
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().expect("block lock poisoned").contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        self.entries.write().expect("block lock poisoned").remove(name).map(|e| e.bytes)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("block lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

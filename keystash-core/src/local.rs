//! In-process storage primitives.
//!
//! These have no visibility outside the process. They are still `Send + Sync`
//! because a cache instance may be shared between threads.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::Result;
use crate::storage::{LockStore, LockToken, MappingStore, SequenceStore, ValueStore};

#[derive(Debug, Default)]
pub struct LocalSequence {
    items: RwLock<Vec<Value>>,
}

impl LocalSequence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceStore for LocalSequence {
    fn push(&self, value: Value) -> Result<()> {
        self.items.write().push(value);
        Ok(())
    }

    fn get(&self, index: usize) -> Result<Option<Value>> {
        Ok(self.items.read().get(index).cloned())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.items.read().len())
    }

    fn to_vec(&self) -> Result<Vec<Value>> {
        Ok(self.items.read().clone())
    }

    fn clear(&self) -> Result<()> {
        self.items.write().clear();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LocalMapping {
    fields: RwLock<HashMap<String, Value>>,
}

impl LocalMapping {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for LocalMapping {
    fn insert(&self, field: &str, value: Value) -> Result<()> {
        self.fields.write().insert(field.to_string(), value);
        Ok(())
    }

    fn get(&self, field: &str) -> Result<Option<Value>> {
        Ok(self.fields.read().get(field).cloned())
    }

    fn remove(&self, field: &str) -> Result<bool> {
        Ok(self.fields.write().remove(field).is_some())
    }

    fn contains(&self, field: &str) -> Result<bool> {
        Ok(self.fields.read().contains_key(field))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.fields.read().keys().cloned().collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.fields.read().len())
    }

    fn clear(&self) -> Result<()> {
        self.fields.write().clear();
        Ok(())
    }
}

/// A one-field cell, empty until set.
#[derive(Debug, Default)]
pub struct LocalValue {
    value: RwLock<Option<Value>>,
}

impl LocalValue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueStore for LocalValue {
    fn get(&self) -> Result<Option<Value>> {
        Ok(self.value.read().clone())
    }

    fn set(&self, value: Option<Value>) -> Result<()> {
        *self.value.write() = value;
        Ok(())
    }
}

/// A lock that never excludes anyone.
///
/// `acquire` returns immediately, so `lock` always runs its critical section right
/// away, even when several callers "hold" it at once. It only suits
/// single-process, cooperative use.
#[derive(Debug)]
pub struct LocalLock {
    name: String,
}

impl LocalLock {
    /// A lock that reports `name` and never blocks.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl LockStore for LocalLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self) -> Result<LockToken> {
        Ok(LockToken::new(0))
    }

    fn release(&self, _token: LockToken) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

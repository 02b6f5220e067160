//! Raw field storage.
//!
//! Backends know nothing about schemas: they map a `StorageKey` plus a field
//! name to a `Value`. The scope of a field decides which key it lives under.

use std::collections::BTreeMap;

use olx_core::{DefinitionId, Result, UsageKey, UserId, Value};

/// Where a field value is stored, derived from the field's scope.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum StorageKey {
    /// Settings, one bucket per usage.
    Usage(UsageKey),
    /// Content, shared by every usage of a definition.
    Definition(DefinitionId),
    /// User state, one bucket per learner and usage.
    Learner(UsageKey, UserId),
    /// User state summary, one bucket per usage.
    Summary(UsageKey),
}

/// Read raw field values.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Box<dyn FieldReader>`.
pub trait FieldReader: Send + Sync {
    /// Read one field.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - The field was never set under this key.
    /// * `Ok(Some(value))` - The stored value.
    /// * `Err(Error)` - The backend failed.
    fn read(&self, key: &StorageKey, field: &str) -> Result<Option<Value>>;
}

/// Write raw field values.
pub trait FieldWriter: Send + Sync {
    fn write(&mut self, key: &StorageKey, field: &str, value: Value) -> Result<()>;

    /// Remove a field, returning what was stored.
    fn remove(&mut self, key: &StorageKey, field: &str) -> Result<Option<Value>>;
}

/// Combined read/write backend.
pub trait FieldBackend: FieldReader + FieldWriter {}
impl<T: FieldReader + FieldWriter> FieldBackend for T {}

impl<T: FieldReader + ?Sized> FieldReader for &mut T {
    fn read(&self, key: &StorageKey, field: &str) -> Result<Option<Value>> {
        (**self).read(key, field)
    }
}

impl<T: FieldWriter + ?Sized> FieldWriter for &mut T {
    fn write(&mut self, key: &StorageKey, field: &str, value: Value) -> Result<()> {
        (**self).write(key, field, value)
    }

    fn remove(&mut self, key: &StorageKey, field: &str) -> Result<Option<Value>> {
        (**self).remove(key, field)
    }
}

impl<T: FieldReader + ?Sized> FieldReader for Box<T> {
    fn read(&self, key: &StorageKey, field: &str) -> Result<Option<Value>> {
        self.as_ref().read(key, field)
    }
}

impl<T: FieldWriter + ?Sized> FieldWriter for Box<T> {
    fn write(&mut self, key: &StorageKey, field: &str, value: Value) -> Result<()> {
        self.as_mut().write(key, field, value)
    }

    fn remove(&mut self, key: &StorageKey, field: &str) -> Result<Option<Value>> {
        self.as_mut().remove(key, field)
    }
}

/// An in-memory backend.
#[derive(Clone, Debug, Default)]
pub struct InMemoryFieldBackend {
    buckets: BTreeMap<StorageKey, BTreeMap<String, Value>>,
}

impl InMemoryFieldBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// All fields stored under one key.
    pub fn bucket(&self, key: &StorageKey) -> Option<&BTreeMap<String, Value>> {
        self.buckets.get(key)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FieldReader for InMemoryFieldBackend {
    fn read(&self, key: &StorageKey, field: &str) -> Result<Option<Value>> {
        Ok(self
            .buckets
            .get(key)
            .and_then(|bucket| bucket.get(field))
            .cloned())
    }
}

impl FieldWriter for InMemoryFieldBackend {
    fn write(&mut self, key: &StorageKey, field: &str, value: Value) -> Result<()> {
        self.buckets
            .entry(key.clone())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &StorageKey, field: &str) -> Result<Option<Value>> {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return Ok(None);
        };
        let removed = bucket.remove(field);
        if bucket.is_empty() {
            self.buckets.remove(key);
        }
        Ok(removed)
    }
}

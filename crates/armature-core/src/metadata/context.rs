//! Thread-safe typed key/value store
//!
//! A [`MetadataContext`] travels alongside operations to carry optional
//! configuration without widening signatures. All mutation and
//! enumeration is internally synchronized; contexts are routinely shared
//! across threads in async flows. Operations that can run without
//! metadata take `Option<&MetadataContext>`, with `None` standing in for
//! an empty context.

use crate::error::{CoreError, CoreResult};
use crate::metadata::key::{DefaultPolicy, KeyId, MetadataKey};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

struct StoredValue {
    name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    serializable: bool,
}

/// One entry of a context snapshot.
#[derive(Clone)]
pub struct MetadataEntry {
    pub key_name: &'static str,
    pub value: Arc<dyn Any + Send + Sync>,
    pub serializable: bool,
}

/// A typed, internally synchronized key/value store.
#[derive(Default)]
pub struct MetadataContext {
    entries: Mutex<HashMap<KeyId, StoredValue>>,
}

impl MetadataContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the stored value for `key`, ignoring any default policy.
    ///
    /// Returns `None` when the slot is absent or the key's read
    /// transform yields nothing (e.g. a dead weak reference).
    pub fn get<T>(&self, key: &MetadataKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = self.entries.lock();
        let stored = entries.get(&key.id())?;
        decode(key, &stored.value)
    }

    /// Read the stored value, falling back to the key's default policy.
    ///
    /// Absent slots never error: a key without a default reads as
    /// `None`. A `default_cached` key computes once and stores the
    /// result, so every later read agrees.
    pub fn get_or_default<T>(&self, key: &MetadataKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        match &key.default {
            DefaultPolicy::None => None,
            DefaultPolicy::Value(value) => Some(value.clone()),
            DefaultPolicy::Compute(compute) => Some(compute(self)),
            DefaultPolicy::ComputeCached(compute) => {
                // Computed outside the lock: the closure may read this
                // same context. A concurrent writer wins the race.
                let computed = compute(self);
                let mut entries = self.entries.lock();
                let stored = entries
                    .entry(key.id())
                    .or_insert_with(|| StoredValue {
                        name: key.name(),
                        value: encode(key, computed),
                        serializable: key.is_serializable(),
                    });
                decode(key, &stored.value)
            }
        }
    }

    /// Store a value for `key`, replacing any previous value.
    ///
    /// Fails with [`CoreError::InvalidValue`] when the key's validator
    /// rejects the value; the previous value is left untouched.
    pub fn set<T>(&self, key: &MetadataKey<T>, value: T) -> CoreResult<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        if let Some(validate) = &key.validator {
            validate(&value).map_err(|reason| CoreError::InvalidValue {
                key: key.name(),
                reason,
            })?;
        }
        let stored = StoredValue {
            name: key.name(),
            value: encode(key, value),
            serializable: key.is_serializable(),
        };
        self.entries.lock().insert(key.id(), stored);
        Ok(())
    }

    /// Remove and return the value stored for `key`, if any.
    pub fn remove<T>(&self, key: &MetadataKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let stored = self.entries.lock().remove(&key.id())?;
        decode(key, &stored.value)
    }

    pub fn contains<T>(&self, key: &MetadataKey<T>) -> bool
    where
        T: Clone + Send + Sync + 'static,
    {
        self.entries.lock().contains_key(&key.id())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Point-in-time snapshot of every entry, safe against concurrent
    /// mutation. Values are shared handles, not copies.
    pub fn snapshot(&self) -> Vec<MetadataEntry> {
        self.entries
            .lock()
            .values()
            .map(|stored| MetadataEntry {
                key_name: stored.name,
                value: stored.value.clone(),
                serializable: stored.serializable,
            })
            .collect()
    }
}

impl std::fmt::Debug for MetadataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        let mut names: Vec<_> = entries.values().map(|v| v.name).collect();
        names.sort_unstable();
        f.debug_struct("MetadataContext").field("keys", &names).finish()
    }
}

fn encode<T>(key: &MetadataKey<T>, value: T) -> Arc<dyn Any + Send + Sync>
where
    T: Clone + Send + Sync + 'static,
{
    match &key.set_transform {
        Some(transform) => transform(value),
        None => Arc::new(value),
    }
}

fn decode<T>(key: &MetadataKey<T>, stored: &Arc<dyn Any + Send + Sync>) -> Option<T>
where
    T: Clone + Send + Sync + 'static,
{
    match &key.get_transform {
        Some(transform) => transform(stored.as_ref()),
        None => stored.as_ref().downcast_ref::<T>().cloned(),
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! String-keyed owned-value map with locked traversal.
//!
//! The managers built on top of this (devices, sessions) expose exactly one
//! lock each; this map *is* that lock. Writers serialize on it, readers
//! never observe a partially-updated entry, and removal drops the value.
//!
//! `for_each` holds the read lock for the whole traversal: the callback
//! must not call back into the same map.

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

#[derive(Debug)]
pub struct IndexedMap<V> {
    inner: RwLock<HashMap<String, V>>,
}

impl<V> Default for IndexedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IndexedMap<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, V>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, V>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace; returns the previous value when replacing.
    pub fn insert(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.write().insert(key.into(), value)
    }

    /// Insert only when the key is vacant; hands the value back otherwise.
    pub fn try_insert(&self, key: impl Into<String>, value: V) -> Result<(), V> {
        let key = key.into();
        let mut map = self.write();
        if map.contains_key(&key) {
            return Err(value);
        }
        map.insert(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Mutate one entry in place under the write lock.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.write().get_mut(key).map(f)
    }

    /// Visit every entry under the read lock.
    pub fn for_each(&self, mut f: impl FnMut(&str, &V)) {
        for (k, v) in self.read().iter() {
            f(k, v);
        }
    }

    /// Keep only entries for which the predicate holds; dropped values run
    /// their destructors before the lock is released.
    pub fn retain(&self, f: impl FnMut(&String, &mut V) -> bool) {
        self.write().retain(f);
    }
}

impl<V: Clone> IndexedMap<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        self.read().get(key).cloned()
    }
}

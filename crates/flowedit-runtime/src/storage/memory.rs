#![forbid(unsafe_code)]

//! In-process [`KeyValueStore`].
//!
//! Clones share the same maps, so a test can keep a handle while a session
//! owns another. A store built with [`MemoryStore::unavailable`] fails every
//! call with [`StorageError::Unavailable`], modelling a host without durable
//! storage.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use super::{KeyValueStore, StorageError, StoreName, check_key};

#[derive(Debug, Default)]
struct Inner {
    flow: RefCell<BTreeMap<String, Vec<u8>>>,
    drafts: RefCell<BTreeMap<String, Vec<u8>>>,
    unavailable: Cell<bool>,
    writes: Cell<u64>,
}

impl Inner {
    fn map(&self, store: StoreName) -> &RefCell<BTreeMap<String, Vec<u8>>> {
        match store {
            StoreName::Flow => &self.flow,
            StoreName::Drafts => &self.drafts,
        }
    }
}

/// Shared in-memory maps.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Rc<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that fails every operation.
    #[must_use]
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.set(!available);
    }

    /// Number of successful `put` calls.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.inner.writes.get()
    }

    /// Write raw bytes, bypassing availability. Used to seed fixtures.
    pub fn insert_raw(&self, store: StoreName, key: &str, value: impl Into<Vec<u8>>) {
        self.inner
            .map(store)
            .borrow_mut()
            .insert(key.to_owned(), value.into());
    }

    /// Read raw bytes, bypassing availability.
    #[must_use]
    pub fn get_raw(&self, store: StoreName, key: &str) -> Option<Vec<u8>> {
        self.inner.map(store).borrow().get(key).cloned()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.inner.unavailable.get() {
            Err(StorageError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for MemoryStore {
    async fn put(&self, store: StoreName, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.check()?;
        check_key(key)?;
        self.inner
            .map(store)
            .borrow_mut()
            .insert(key.to_owned(), value);
        self.inner.writes.set(self.inner.writes.get() + 1);
        Ok(())
    }

    async fn get(&self, store: StoreName, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check()?;
        Ok(self.get_raw(store, key))
    }

    async fn get_all_keys(&self, store: StoreName) -> Result<BTreeSet<String>, StorageError> {
        self.check()?;
        Ok(self.inner.map(store).borrow().keys().cloned().collect())
    }

    async fn delete(&self, store: StoreName, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.map(store).borrow_mut().remove(key);
        Ok(())
    }

    async fn rename(&self, store: StoreName, from: &str, to: &str) -> Result<(), StorageError> {
        self.check()?;
        check_key(to)?;
        let mut map = self.inner.map(store).borrow_mut();
        if !map.contains_key(from) {
            return Err(StorageError::NotFound(from.to_owned()));
        }
        if from == to {
            return Ok(());
        }
        if map.contains_key(to) {
            return Err(StorageError::KeyExists(to.to_owned()));
        }
        if let Some(value) = map.remove(from) {
            map.insert(to.to_owned(), value);
        }
        Ok(())
    }
}

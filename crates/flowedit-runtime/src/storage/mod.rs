#![forbid(unsafe_code)]

//! Durable storage for the live flow and named drafts.
//!
//! # Layout
//!
//! One database holds two key spaces:
//!
//! | Store               | Keys                 | Values           |
//! |---------------------|----------------------|------------------|
//! | [`StoreName::Flow`]   | `"state"` only     | JSON `FlowState` |
//! | [`StoreName::Drafts`] | user-chosen names  | JSON `FlowState` |
//!
//! A separate [`TextStore`] keeps a best-effort JSON copy of the live flow
//! under [`FALLBACK_KEY`], for hosts where the database is unavailable.
//!
//! # Backends
//!
//! - [`RedbStore`]: a redb file served by a writer thread.
//! - [`MemoryStore`]: in-process maps, optionally reporting unavailable.
//! - [`FileTextStore`] / [`MemoryTextStore`]: fallback text stores.
//!
//! # Failure model
//!
//! Every operation returns a [`StorageError`] rather than panicking. Callers
//! that mirror state treat an error as "not persisted this time".

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

mod gateway;
mod memory;
mod mirror;
mod redb_store;
mod text;

pub use gateway::PersistenceGateway;
pub use memory::MemoryStore;
pub use mirror::{Mirror, MirrorStats};
pub use redb_store::RedbStore;
pub use text::{FileTextStore, MemoryTextStore};

/// Key of the singleton current-state slot.
pub const CURRENT_STATE_KEY: &str = "state";

/// Key of the fallback text copy.
pub const FALLBACK_KEY: &str = "flow-state";

/// On-disk schema version.
pub const SCHEMA_VERSION: u64 = 1;

/// The two logical key spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreName {
    /// Singleton current-state slot.
    Flow,
    /// Named drafts.
    Drafts,
}

impl StoreName {
    pub const ALL: [StoreName; 2] = [StoreName::Flow, StoreName::Drafts];

    /// Table name in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Drafts => "drafts",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from storage backends and the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Durable storage is not available in this host.
    Unavailable,
    /// The backend failed (I/O, transaction, corruption).
    Backend(String),
    /// A value could not be encoded or decoded.
    Serialization(String),
    /// The database was written by an incompatible schema.
    SchemaMismatch { found: u64, expected: u64 },
    /// The key does not exist.
    NotFound(String),
    /// The destination key of a rename already exists.
    KeyExists(String),
    /// The key is empty or otherwise unusable.
    InvalidKey(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "durable storage is unavailable"),
            Self::Backend(msg) => write!(f, "storage backend error: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization error: {msg}"),
            Self::SchemaMismatch { found, expected } => write!(
                f,
                "schema version mismatch: found {found}, expected {expected}"
            ),
            Self::NotFound(key) => write!(f, "key not found: {key}"),
            Self::KeyExists(key) => write!(f, "key already exists: {key}"),
            Self::InvalidKey(key) => write!(f, "invalid key: {key:?}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Asynchronous key-value storage with two key spaces.
///
/// Implementations must never panic on backend failure. [`rename`] is a
/// single transaction: either the value moves to the new key and the old key
/// disappears, or nothing changes.
///
/// [`rename`]: KeyValueStore::rename
pub trait KeyValueStore {
    /// Insert or overwrite `key`.
    fn put(
        &self,
        store: StoreName,
        key: &str,
        value: Vec<u8>,
    ) -> impl Future<Output = Result<(), StorageError>>;

    /// Read `key`, or `None` if absent.
    fn get(
        &self,
        store: StoreName,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, StorageError>>;

    /// All keys in `store`, sorted.
    fn get_all_keys(
        &self,
        store: StoreName,
    ) -> impl Future<Output = Result<BTreeSet<String>, StorageError>>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&self, store: StoreName, key: &str) -> impl Future<Output = Result<(), StorageError>>;

    /// Move the value at `from` to `to`.
    ///
    /// Fails with [`StorageError::NotFound`] if `from` is absent and
    /// [`StorageError::KeyExists`] if `to` is present. `from == to` is a
    /// no-op once `from` is known to exist.
    fn rename(
        &self,
        store: StoreName,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<(), StorageError>>;
}

/// Synchronous string store used as a fallback copy of the live flow.
pub trait TextStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

pub(crate) fn check_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_names_match_tables() {
        assert_eq!(StoreName::Flow.as_str(), "flow");
        assert_eq!(StoreName::Drafts.to_string(), "drafts");
    }

    #[test]
    fn error_display_is_descriptive() {
        let err = StorageError::SchemaMismatch {
            found: 2,
            expected: 1,
        };
        assert_eq!(
            err.to_string(),
            "schema version mismatch: found 2, expected 1"
        );
        assert!(StorageError::InvalidKey(String::new()).to_string().contains("\"\""));
    }

    #[test]
    fn empty_keys_are_rejected() {
        assert_eq!(check_key(""), Err(StorageError::InvalidKey(String::new())));
        assert!(check_key("v1").is_ok());
    }
}

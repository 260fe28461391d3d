#![forbid(unsafe_code)]

//! redb-backed [`KeyValueStore`].
//!
//! Database work runs on a writer thread owned by the store, so awaiting an
//! operation never blocks the caller's thread on file I/O. Clones share the
//! thread. Dropping the last clone closes the database and joins it.
//!
//! The thread opens the file on its first job, creating it and its tables
//! if absent and recording [`SCHEMA_VERSION`] in a `meta` table; a file
//! carrying a different version is refused and retried on the next job.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use futures_channel::oneshot;
use redb::{ReadableDatabase, ReadableTable, TableDefinition, TableError};
use tracing::{Span, debug, info_span, warn};

use super::{KeyValueStore, SCHEMA_VERSION, StorageError, StoreName, check_key};

const FLOW_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("flow");
const DRAFTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("drafts");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");
const SCHEMA_VERSION_KEY: &str = "schema_version";

fn table(store: StoreName) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match store {
        StoreName::Flow => FLOW_TABLE,
        StoreName::Drafts => DRAFTS_TABLE,
    }
}

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("{e}"))
}

// ============================================================================
// Writer thread
// ============================================================================

type Job = Box<dyn FnOnce(&mut Connection) + Send>;

/// The writer thread's handle on the file.
struct Connection {
    path: PathBuf,
    db: Option<redb::Database>,
}

impl Connection {
    fn database(&mut self) -> Result<&redb::Database, StorageError> {
        let db = match self.db.take() {
            Some(db) => db,
            None => open(&self.path)?,
        };
        Ok(&*self.db.insert(db))
    }

    fn close(&mut self) {
        self.db = None;
    }
}

struct Worker {
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(path: PathBuf) -> Self {
        let (jobs, queue) = unbounded::<Job>();
        let spawned = thread::Builder::new()
            .name("flowedit-redb".into())
            .spawn(move || run(path, queue));
        match spawned {
            Ok(thread) => Self {
                jobs: Some(jobs),
                thread: Some(thread),
            },
            Err(err) => {
                warn!(error = %err, "redb writer thread failed to start");
                Self {
                    jobs: None,
                    thread: None,
                }
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Disconnect first so the thread drains its queue and exits.
        self.jobs.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("redb writer thread panicked");
        }
    }
}

fn run(path: PathBuf, queue: Receiver<Job>) {
    let mut conn = Connection { path, db: None };
    for job in queue.iter() {
        job(&mut conn);
    }
    debug!(path = %conn.path.display(), "redb writer stopped");
}

/// Open the file, creating tables and checking the schema version.
fn open(path: &Path) -> Result<redb::Database, StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let db = redb::Database::create(path).map_err(backend)?;
    let found = {
        let read_txn = db.begin_read().map_err(backend)?;
        match read_txn.open_table(META_TABLE) {
            Ok(meta) => meta
                .get(SCHEMA_VERSION_KEY)
                .map_err(backend)?
                .map(|v| v.value()),
            Err(TableError::TableDoesNotExist(_)) => None,
            Err(e) => return Err(backend(e)),
        }
    };
    match found {
        Some(version) if version == SCHEMA_VERSION => {}
        Some(version) => {
            return Err(StorageError::SchemaMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }
        None => initialize(&db, path)?,
    }
    Ok(db)
}

fn initialize(db: &redb::Database, path: &Path) -> Result<(), StorageError> {
    let write_txn = db.begin_write().map_err(backend)?;
    {
        write_txn.open_table(FLOW_TABLE).map_err(backend)?;
        write_txn.open_table(DRAFTS_TABLE).map_err(backend)?;
        let mut meta = write_txn.open_table(META_TABLE).map_err(backend)?;
        meta.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION)
            .map_err(backend)?;
    }
    write_txn.commit().map_err(backend)?;
    debug!(path = %path.display(), version = SCHEMA_VERSION, "database initialized");
    Ok(())
}

fn stamp(path: &Path, version: u64) -> Result<(), StorageError> {
    let db = redb::Database::create(path).map_err(backend)?;
    let write_txn = db.begin_write().map_err(backend)?;
    {
        let mut meta = write_txn.open_table(META_TABLE).map_err(backend)?;
        meta.insert(SCHEMA_VERSION_KEY, version).map_err(backend)?;
    }
    write_txn.commit().map_err(backend)?;
    Ok(())
}

fn rename_in(
    db: &redb::Database,
    store: StoreName,
    from: &str,
    to: &str,
) -> Result<(), StorageError> {
    let write_txn = db.begin_write().map_err(backend)?;
    let outcome = {
        let mut table = write_txn.open_table(table(store)).map_err(backend)?;
        let exists = table.get(from).map_err(backend)?.is_some();
        if !exists {
            Err(StorageError::NotFound(from.to_owned()))
        } else if from == to {
            Ok(false)
        } else if table.get(to).map_err(backend)?.is_some() {
            Err(StorageError::KeyExists(to.to_owned()))
        } else {
            let value = table
                .remove(from)
                .map_err(backend)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StorageError::NotFound(from.to_owned()))?;
            table.insert(to, value.as_slice()).map_err(backend)?;
            Ok(true)
        }
    };
    match outcome {
        Ok(true) => write_txn.commit().map_err(backend),
        Ok(false) => write_txn.abort().map_err(backend),
        Err(err) => {
            write_txn.abort().map_err(backend)?;
            Err(err)
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// A redb database file served by a writer thread.
#[derive(Clone)]
pub struct RedbStore {
    path: PathBuf,
    worker: Arc<Worker>,
}

impl fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Use the database at `path`. The writer thread starts now; the file
    /// is not touched until the first operation.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let worker = Arc::new(Worker::spawn(path.clone()));
        Self { path, worker }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp the file with an arbitrary schema version and wait for it.
    /// Used to exercise version checks.
    #[doc(hidden)]
    pub fn write_schema_version(&self, version: u64) -> Result<(), StorageError> {
        let (reply, outcome) = crossbeam_channel::bounded(1);
        self.submit(Box::new(move |conn: &mut Connection| {
            conn.close();
            let _ = reply.send(stamp(&conn.path, version));
        }))?;
        outcome.recv().unwrap_or(Err(StorageError::Unavailable))
    }

    fn submit(&self, job: Job) -> Result<(), StorageError> {
        let jobs = self.worker.jobs.as_ref().ok_or(StorageError::Unavailable)?;
        jobs.send(job).map_err(|_| StorageError::Unavailable)
    }

    /// Run `op` on the writer thread inside `span` and await its result.
    async fn call<T, Op>(&self, span: Span, op: Op) -> Result<T, StorageError>
    where
        T: Send + 'static,
        Op: FnOnce(&redb::Database) -> Result<T, StorageError> + Send + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        self.submit(Box::new(move |conn: &mut Connection| {
            let _entered = span.enter();
            let _ = reply.send(conn.database().and_then(op));
        }))?;
        outcome.await.unwrap_or(Err(StorageError::Unavailable))
    }
}

impl KeyValueStore for RedbStore {
    async fn put(&self, store: StoreName, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        check_key(key)?;
        let span = info_span!("storage.put", store = store.as_str(), bytes = value.len());
        let key = key.to_owned();
        self.call(span, move |db| {
            let write_txn = db.begin_write().map_err(backend)?;
            {
                let mut table = write_txn.open_table(table(store)).map_err(backend)?;
                table.insert(key.as_str(), value.as_slice()).map_err(backend)?;
            }
            write_txn.commit().map_err(backend)
        })
        .await
    }

    async fn get(&self, store: StoreName, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let span = info_span!("storage.get", store = store.as_str());
        let key = key.to_owned();
        self.call(span, move |db| {
            let read_txn = db.begin_read().map_err(backend)?;
            let table = read_txn.open_table(table(store)).map_err(backend)?;
            let value = table
                .get(key.as_str())
                .map_err(backend)?
                .map(|v| v.value().to_vec());
            Ok(value)
        })
        .await
    }

    async fn get_all_keys(&self, store: StoreName) -> Result<BTreeSet<String>, StorageError> {
        let span = info_span!("storage.keys", store = store.as_str());
        self.call(span, move |db| {
            let read_txn = db.begin_read().map_err(backend)?;
            let table = read_txn.open_table(table(store)).map_err(backend)?;
            let mut keys = BTreeSet::new();
            for entry in table.iter().map_err(backend)? {
                let (key, _) = entry.map_err(backend)?;
                keys.insert(key.value().to_owned());
            }
            Ok(keys)
        })
        .await
    }

    async fn delete(&self, store: StoreName, key: &str) -> Result<(), StorageError> {
        let span = info_span!("storage.delete", store = store.as_str());
        let key = key.to_owned();
        self.call(span, move |db| {
            let write_txn = db.begin_write().map_err(backend)?;
            {
                let mut table = write_txn.open_table(table(store)).map_err(backend)?;
                table.remove(key.as_str()).map_err(backend)?;
            }
            write_txn.commit().map_err(backend)
        })
        .await
    }

    async fn rename(&self, store: StoreName, from: &str, to: &str) -> Result<(), StorageError> {
        check_key(to)?;
        let span = info_span!("storage.rename", store = store.as_str());
        let (from, to) = (from.to_owned(), to.to_owned());
        self.call(span, move |db| rename_in(db, store, &from, &to))
            .await
    }
}

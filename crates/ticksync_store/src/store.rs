//! The store handle.

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::StoreResult;
use crate::log::{CommitLog, CommitRecord};
use crate::state::StoreState;
use crate::storage::{FileBackend, StorageBackend};
use crate::transaction::{ReadTransaction, WriteTransaction};
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An embedded multi-version row store.
///
/// Readers get a fixed snapshot and never block. Writers serialize on a
/// single lock held for the whole write transaction. Each commit receives
/// the next sequence number, is appended to the commit log (when the
/// store has one), installed into the versioned state, and only then
/// published by advancing the committed sequence.
pub struct Store {
    config: StoreConfig,
    _dir: Option<StoreDir>,
    log: Option<Mutex<CommitLog>>,
    state: RwLock<StoreState>,
    next_txid: AtomicU64,
    committed_seq: AtomicU64,
    write_lock: Mutex<()>,
    audit_enabled: AtomicBool,
}

impl Store {
    /// Opens a volatile store with no commit log.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::open_in_memory_with(StoreConfig::default())
    }

    /// Opens a volatile store with the given configuration.
    #[must_use]
    pub fn open_in_memory_with(config: StoreConfig) -> Self {
        Self::assemble(config, None, None)
    }

    /// Opens (or creates) a durable store in a directory.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if another handle owns the directory, or an
    /// error if the commit log cannot be read.
    pub fn open(path: &Path, config: StoreConfig) -> StoreResult<Self> {
        let dir = StoreDir::open(path)?;
        let backend = FileBackend::open(&dir.log_path())?;
        Self::recover(config, Some(dir), Box::new(backend))
    }

    /// Opens a store over an arbitrary storage backend, replaying
    /// whatever commits it already holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit log cannot be read.
    pub fn with_backend(backend: Box<dyn StorageBackend>, config: StoreConfig) -> StoreResult<Self> {
        Self::recover(config, None, backend)
    }

    fn recover(
        config: StoreConfig,
        dir: Option<StoreDir>,
        backend: Box<dyn StorageBackend>,
    ) -> StoreResult<Self> {
        let mut log = CommitLog::new(backend, config.sync_on_commit);
        let records = log.replay()?;

        let mut state = StoreState::default();
        let mut last_seq = SequenceNumber::new(0);
        let mut last_txid = TransactionId::new(0);
        let replayed = records.len();
        for record in records {
            last_seq = last_seq.max(record.seq);
            last_txid = last_txid.max(record.txid);
            state.apply(record);
        }
        tracing::debug!(commits = replayed, committed = %last_seq, "store recovered");

        let store = Self::assemble(config, dir, Some(log));
        *store.state.write() = state;
        store.committed_seq.store(last_seq.as_u64(), Ordering::SeqCst);
        store
            .next_txid
            .store(last_txid.as_u64() + 1, Ordering::SeqCst);
        Ok(store)
    }

    fn assemble(config: StoreConfig, dir: Option<StoreDir>, log: Option<CommitLog>) -> Self {
        let audit = config.audit_changes;
        Self {
            config,
            _dir: dir,
            log: log.map(Mutex::new),
            state: RwLock::new(StoreState::default()),
            next_txid: AtomicU64::new(1),
            committed_seq: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            audit_enabled: AtomicBool::new(audit),
        }
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Begins a read transaction on the current committed state.
    #[must_use]
    pub fn begin_read(&self) -> ReadTransaction<'_> {
        ReadTransaction::new(self, self.allocate_txid(), self.committed_seq())
    }

    /// Begins a write transaction, blocking until the write lock is free.
    #[must_use]
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        let guard = self.write_lock.lock();
        WriteTransaction::new(self, guard, self.allocate_txid(), self.committed_seq())
    }

    /// Runs `f` in a write transaction, committing if it returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns the closure's error (nothing is committed) or a commit error.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> Result<T, E>,
        E: From<crate::error::StoreError>,
    {
        let mut txn = self.begin_write();
        let value = f(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Creates a table if it does not already exist.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid name or a failed commit.
    pub fn ensure_table(&self, name: &str) -> StoreResult<()> {
        if self.has_table(name) {
            return Ok(());
        }
        self.transaction(|txn| txn.create_table(name))
    }

    /// Returns true if the table exists.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.state.read().table(name).is_some()
    }

    /// Returns all table names, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the latest committed sequence number.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::SeqCst))
    }

    /// Returns whether changelog capture is globally enabled.
    #[must_use]
    pub fn audit_enabled(&self) -> bool {
        self.audit_enabled.load(Ordering::SeqCst)
    }

    /// Enables or disables changelog capture for every later commit.
    pub fn set_audit_enabled(&self, enabled: bool) {
        self.audit_enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn state(&self) -> &RwLock<StoreState> {
        &self.state
    }

    /// Appends, installs and publishes a commit. Caller holds the write lock.
    pub(crate) fn install(&self, record: CommitRecord) -> StoreResult<()> {
        if let Some(log) = &self.log {
            log.lock().append(&record)?;
        }
        let seq = record.seq;
        tracing::trace!(%seq, rows = record.rows.len(), "commit installed");
        self.state.write().apply(record);
        self.committed_seq.store(seq.as_u64(), Ordering::SeqCst);
        Ok(())
    }

    fn allocate_txid(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("committed_seq", &self.committed_seq())
            .field("durable", &self.log.is_some())
            .finish_non_exhaustive()
    }
}

//! The engine handle shared by request workers.
//!
//! # Transactions
//!
//! Every mutation runs inside one `BEGIN IMMEDIATE` transaction: the guard
//! reads the governing lock state and the write lands in the same
//! transaction, so a concurrent submit either commits before an answer write
//! starts or is observed by it. An error (or a panic) before `commit` drops
//! the transaction, which rolls it back.
//!
//! ```text
//! FormEngine
//! ├── db: Mutex<Connection>   (serializes in-process callers)
//! ├── retry: RetryPolicy      (reads and idempotent upserts only)
//! └── notifier: dyn Notifier  (invoked after commit)
//! ```
//!
//! Separate engines, or processes, on the same file serialize through
//! SQLite's write lock and the configured busy timeout.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::notify::{self, FormEvent, NoopNotifier, Notifier};
use crate::retry::RetryPolicy;
use crate::sqlite_util::{configure_connection, open_secure_db, restrict_db_files};
use crate::{EngineError, schema};

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a writer waits on another connection's lock before failing
    /// with a transient busy error.
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Form submission and answer-storage engine.
///
/// `Send + Sync`; share it between workers with `Arc`.
pub struct FormEngine {
    db: Mutex<Connection>,
    retry: RetryPolicy,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for FormEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormEngine")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl FormEngine {
    /// Open or create a form database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let db = open_secure_db(path)?;
        let engine = Self::initialize(db, options)
            .with_context(|| format!("Failed to initialize form store at {}", path.display()))?;
        restrict_db_files(path)?;
        tracing::info!(path = %path.display(), "Form store opened");
        Ok(engine)
    }

    /// Open an in-memory engine (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory form store")?;
        Self::initialize(db, StoreOptions::default())
    }

    fn initialize(db: Connection, options: StoreOptions) -> Result<Self> {
        configure_connection(&db, options.busy_timeout)?;
        schema::apply(&db)?;
        Ok(Self {
            db: Mutex::new(db),
            retry: options.retry,
            notifier: Arc::new(NoopNotifier),
        })
    }

    /// Replace the post-commit notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction already rolled back on unwind, so the
        // connection behind a poisoned lock is still consistent.
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` in one immediate transaction; commit on `Ok`, roll back otherwise.
    pub(crate) fn write<T>(
        &self,
        op: impl FnOnce(&Transaction<'_>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = op(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// [`Self::write`] with transient-failure retries. Only for idempotent writes.
    pub(crate) fn write_idempotent<T>(
        &self,
        op_name: &str,
        op: impl Fn(&Transaction<'_>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.retry.run(op_name, || self.write(&op))
    }

    pub(crate) fn read<T>(
        &self,
        op_name: &str,
        op: impl Fn(&Connection) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.retry.run(op_name, || op(&*self.conn()))
    }

    pub(crate) fn emit(&self, event: FormEvent) {
        notify::dispatch(self.notifier.as_ref(), &event);
    }
}

/// Current time at the millisecond precision rows are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Decode a TEXT column into a domain type. A failure means the row was
/// written by something other than this engine.
pub(crate) fn parse_column<T>(column: &'static str, raw: &str) -> Result<T, EngineError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|err| EngineError::invariant(format!("{column} holds {raw:?}: {err}")))
}

pub(crate) fn parse_optional<T>(
    column: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, EngineError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.map(|raw| parse_column(column, &raw)).transpose()
}

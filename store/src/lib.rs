//! Form submission and answer storage over SQLite
//!
//! This crate provides:
//! - Form lifecycle (draft → submitted → reviewed) with a one-way lock
//! - Typed answer storage keyed by dotted field keys
//! - Per-section admin review tracking
//! - Document binding with approval freeze
//! - An immutability guard run inside every mutating transaction
//!
//! # Architecture
//!
//! ```text
//! FormEngine
//! ├── forms        (lifecycle, progress, review)
//! ├── answers      (value store, list search)
//! ├── sections     (review flags)
//! ├── documents    (binding, approval)
//! └── guard        (lock checks, same transaction as the write)
//!
//! Notifier (post-commit FormEvent sink)
//! RetryPolicy (transient busy/locked errors, idempotent paths only)
//! ```

mod answers;
mod documents;
mod engine;
mod error;
mod forms;
mod guard;
mod notify;
mod retry;
mod schema;
mod sections;
mod sqlite_util;

pub use engine::{FormEngine, StoreOptions};
pub use error::{EngineError, EntityRef};
pub use guard::FormField;
pub use notify::{FormEvent, LogNotifier, NoopNotifier, Notifier, NotifyError};
pub use retry::RetryPolicy;

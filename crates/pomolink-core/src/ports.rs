//! Narrow interfaces to the collaborators the timer does not own.

use std::collections::HashSet;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::StorageError;
use crate::sync::CompletedSessionRecord;
use crate::timer::{PersistedTimer, SessionKind};

/// User-visible completion alerts.
///
/// Scheduled on every entry into Running so the alert fires even if the
/// process is suspended, cancelled on every exit from Running.
pub trait Notifier: Send + Sync {
    fn schedule_completion(&self, kind: SessionKind, in_secs: u64);
    fn cancel_all(&self);
}

/// Notifier for surfaces without alerts (or with notifications disabled).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn schedule_completion(&self, _kind: SessionKind, _in_secs: u64) {}
    fn cancel_all(&self) {}
}

/// Append-only log of finished sessions.
pub trait SessionStore: Send + Sync {
    /// Returns `Ok(false)` when a record with the same id already exists.
    fn append(&self, record: &CompletedSessionRecord) -> Result<bool, StorageError>;
}

/// In-memory store, deduplicating by record id.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    seen: HashSet<Uuid>,
    records: Vec<CompletedSessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CompletedSessionRecord> {
        self.inner
            .lock()
            .map(|inner| inner.records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn append(&self, record: &CompletedSessionRecord) -> Result<bool, StorageError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
        if !inner.seen.insert(record.id) {
            return Ok(false);
        }
        inner.records.push(record.clone());
        Ok(true)
    }
}

/// Where a surface keeps its timer between process lifetimes.
pub trait StatePersistence: Send + Sync {
    fn save_timer(&self, timer: &PersistedTimer) -> Result<(), StorageError>;
}

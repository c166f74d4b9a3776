//! Storage shared with the ambient display.
//!
//! Holds one compact snapshot (written by the primary surface) and at most
//! one pending action token (written by the display).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, ValidationError};
use crate::timer::{ceil_secs, SessionKind, TimerState, TimerStatus};

/// A control tapped on the ambient display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbientAction {
    Play,
    Pause,
    Reset,
    Skip,
}

impl AmbientAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbientAction::Play => "play",
            AmbientAction::Pause => "pause",
            AmbientAction::Reset => "reset",
            AmbientAction::Skip => "skip",
        }
    }
}

impl FromStr for AmbientAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(AmbientAction::Play),
            "pause" => Ok(AmbientAction::Pause),
            "reset" => Ok(AmbientAction::Reset),
            "skip" => Ok(AmbientAction::Skip),
            other => Err(ValidationError::InvalidValue {
                field: "action".into(),
                message: format!("unknown ambient action '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub action: AmbientAction,
    pub requested_at: DateTime<Utc>,
}

/// What the display renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbientSnapshot {
    pub kind: SessionKind,
    pub remaining_seconds: u64,
    pub is_running: bool,
    pub total_duration: u64,
    pub absolute_end_at: Option<DateTime<Utc>>,
    pub written_at: DateTime<Utc>,
}

impl AmbientSnapshot {
    pub fn from_state(state: &TimerState, now: DateTime<Utc>) -> Self {
        Self {
            kind: state.kind,
            remaining_seconds: state.remaining_at(now),
            is_running: state.status == TimerStatus::Running,
            total_duration: state.total_duration_secs,
            absolute_end_at: state.absolute_end_at,
            written_at: now,
        }
    }

    /// Remaining time as the display would show it at `now`.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        match (self.is_running, self.absolute_end_at) {
            (true, Some(end)) => ceil_secs(end - now),
            _ => self.remaining_seconds,
        }
    }
}

pub trait AmbientStorage: Send + Sync {
    fn write_snapshot(&self, snapshot: &AmbientSnapshot) -> Result<(), StorageError>;
    fn read_snapshot(&self) -> Result<Option<AmbientSnapshot>, StorageError>;
    /// Display side: replace any pending token.
    fn request_action(&self, action: AmbientAction, at: DateTime<Utc>) -> Result<(), StorageError>;
    fn read_pending_action(&self) -> Result<Option<PendingAction>, StorageError>;
    fn clear_pending_action(&self) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct AmbientDocument {
    #[serde(default)]
    snapshot: Option<AmbientSnapshot>,
    #[serde(default)]
    pending_action: Option<PendingAction>,
}

#[derive(Debug, Default)]
pub struct MemoryAmbientStorage {
    doc: Mutex<AmbientDocument>,
}

impl MemoryAmbientStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_doc<T>(&self, f: impl FnOnce(&mut AmbientDocument) -> T) -> Result<T, StorageError> {
        let mut doc = self.doc.lock().map_err(|_| StorageError::Locked)?;
        Ok(f(&mut doc))
    }
}

impl AmbientStorage for MemoryAmbientStorage {
    fn write_snapshot(&self, snapshot: &AmbientSnapshot) -> Result<(), StorageError> {
        self.with_doc(|doc| doc.snapshot = Some(snapshot.clone()))
    }

    fn read_snapshot(&self) -> Result<Option<AmbientSnapshot>, StorageError> {
        self.with_doc(|doc| doc.snapshot.clone())
    }

    fn request_action(&self, action: AmbientAction, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.with_doc(|doc| {
            doc.pending_action = Some(PendingAction {
                action,
                requested_at: at,
            })
        })
    }

    fn read_pending_action(&self) -> Result<Option<PendingAction>, StorageError> {
        self.with_doc(|doc| doc.pending_action.clone())
    }

    fn clear_pending_action(&self) -> Result<(), StorageError> {
        self.with_doc(|doc| doc.pending_action = None)
    }
}

/// Single JSON document on disk. Writes go through a temp file and a rename
/// so a reader never sees a partial document.
#[derive(Debug)]
pub struct FileAmbientStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAmbientStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<AmbientDocument, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                key: self.path.display().to_string(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AmbientDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, doc: &AmbientDocument) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut AmbientDocument)) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Locked)?;
        let mut doc = self.read()?;
        f(&mut doc);
        self.write(&doc)
    }
}

impl AmbientStorage for FileAmbientStorage {
    fn write_snapshot(&self, snapshot: &AmbientSnapshot) -> Result<(), StorageError> {
        self.update(|doc| doc.snapshot = Some(snapshot.clone()))
    }

    fn read_snapshot(&self) -> Result<Option<AmbientSnapshot>, StorageError> {
        Ok(self.read()?.snapshot)
    }

    fn request_action(&self, action: AmbientAction, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.update(|doc| {
            doc.pending_action = Some(PendingAction {
                action,
                requested_at: at,
            })
        })
    }

    fn read_pending_action(&self) -> Result<Option<PendingAction>, StorageError> {
        Ok(self.read()?.pending_action)
    }

    fn clear_pending_action(&self) -> Result<(), StorageError> {
        self.update(|doc| doc.pending_action = None)
    }
}

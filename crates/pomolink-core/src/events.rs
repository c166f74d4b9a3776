use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::{CompletedSessionRecord, Surface};
use crate::timer::{SessionKind, TimerStatus};

/// Every state change of a surface's timer produces an Event.
/// Front-ends print them; the ambient bridge uses them to decide when to
/// write a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        kind: SessionKind,
        remaining_secs: u64,
        resumed: bool,
        ends_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    TimerPaused {
        kind: SessionKind,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        kind: SessionKind,
        at: DateTime<Utc>,
    },
    KindChanged {
        from: SessionKind,
        to: SessionKind,
        at: DateTime<Utc>,
    },
    /// A session ended, by expiry or by skip. The timer is now idle on `next_kind`.
    SessionCompleted {
        record: CompletedSessionRecord,
        next_kind: SessionKind,
        completed_work_sessions: u32,
        at: DateTime<Utc>,
    },
    /// The completed-work tally was reset because the calendar day changed.
    TallyRolledOver {
        discarded: u32,
        at: DateTime<Utc>,
    },
    RemoteStateApplied {
        from: Surface,
        status: TimerStatus,
        kind: SessionKind,
        at: DateTime<Utc>,
    },
    SettingsApplied {
        remote: bool,
        display_updated: bool,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        status: TimerStatus,
        kind: SessionKind,
        label: String,
        remaining_secs: u64,
        total_secs: u64,
        progress: f64,
        completed_work_sessions: u32,
        ends_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Whether the ambient display should be refreshed immediately.
    pub fn refreshes_ambient(&self) -> bool {
        !matches!(self, Event::StateSnapshot { .. } | Event::TallyRolledOver { .. })
    }
}

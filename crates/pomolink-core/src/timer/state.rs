use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::kind::SessionKind;
use super::settings::{DurationPolicy, TimerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
}

/// Authoritative runtime state of one surface's timer.
///
/// While `Running`, `absolute_end_at` is the only trusted quantity;
/// `remaining_secs` is a display cache re-derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub kind: SessionKind,
    pub remaining_secs: u64,
    /// Fixed when the session starts.
    pub total_duration_secs: u64,
    pub status: TimerStatus,
    pub completed_work_sessions: u32,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub session_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub absolute_end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_active_day: Option<NaiveDate>,
}

impl TimerState {
    /// First-run state: an idle work session at full length.
    pub fn idle(settings: &TimerSettings) -> Self {
        let duration = settings.duration_for(SessionKind::Work);
        Self {
            kind: SessionKind::Work,
            remaining_secs: duration,
            total_duration_secs: duration,
            status: TimerStatus::Idle,
            completed_work_sessions: 0,
            session_id: None,
            session_started_at: None,
            absolute_end_at: None,
            last_active_day: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    /// Seconds left before `absolute_end_at`, rounded up; zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        match (self.status, self.absolute_end_at) {
            (TimerStatus::Running, Some(end)) => ceil_secs(end - now),
            _ => self.remaining_secs,
        }
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(
            (self.status, self.absolute_end_at),
            (TimerStatus::Running, Some(end)) if now >= end
        )
    }

    /// 0.0 .. 1.0 progress within the current session.
    pub fn progress(&self) -> f64 {
        if self.total_duration_secs == 0 {
            return 0.0;
        }
        let done = 1.0 - (self.remaining_secs as f64 / self.total_duration_secs as f64);
        done.clamp(0.0, 1.0)
    }

    /// Return the idle display for `kind`, dropping any in-progress session.
    pub(crate) fn make_idle(&mut self, kind: SessionKind, settings: &TimerSettings) {
        let duration = settings.duration_for(kind);
        self.kind = kind;
        self.status = TimerStatus::Idle;
        self.remaining_secs = duration;
        self.total_duration_secs = duration;
        self.session_id = None;
        self.session_started_at = None;
        self.absolute_end_at = None;
    }
}

/// What a surface writes to disk between process lifetimes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTimer {
    pub state: TimerState,
    /// High-water mark for sync conflict resolution.
    #[serde(default)]
    pub last_action_at: Option<DateTime<Utc>>,
    /// Timestamp of the newest settings adopted, local or remote.
    #[serde(default)]
    pub last_settings_at: Option<DateTime<Utc>>,
}

pub(crate) fn ceil_secs(delta: chrono::Duration) -> u64 {
    let ms = delta.num_milliseconds();
    if ms <= 0 {
        0
    } else {
        (ms as u64).div_ceil(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn remaining_rounds_up_partial_seconds() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap();
        let mut state = TimerState::idle(&TimerSettings::default());
        state.status = TimerStatus::Running;
        state.absolute_end_at = Some(now + Duration::milliseconds(1500));
        assert_eq!(state.remaining_at(now), 2);
        assert_eq!(state.remaining_at(now + Duration::seconds(5)), 0);
        assert!(state.has_expired(now + Duration::milliseconds(1500)));
    }

    #[test]
    fn persisted_state_tolerates_missing_optional_fields() {
        let json = r#"{
            "state": {
                "kind": "short_break",
                "remaining_secs": 300,
                "total_duration_secs": 300,
                "status": "idle",
                "completed_work_sessions": 2
            }
        }"#;
        let p: PersistedTimer = serde_json::from_str(json).unwrap();
        assert_eq!(p.state.kind, SessionKind::ShortBreak);
        assert!(p.state.absolute_end_at.is_none());
        assert!(p.last_action_at.is_none());
    }
}

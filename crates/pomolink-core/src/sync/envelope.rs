//! Typed, timestamped messages exchanged between surfaces.
//!
//! Frames on the wire are JSON documents tagged by `type`. Anything that
//! fails to decode is rejected as [`SyncError::Malformed`] and the receiver
//! keeps its last-known-good state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;
use crate::timer::{SessionKind, TimerSettings, TimerState, TimerStatus};

/// Which process produced a message or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Primary,
    Companion,
}

impl Surface {
    pub fn peer(&self) -> Surface {
        match self {
            Surface::Primary => Surface::Companion,
            Surface::Companion => Surface::Primary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Primary => "primary",
            Surface::Companion => "companion",
        }
    }
}

impl std::str::FromStr for Surface {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Surface::Primary),
            "companion" => Ok(Surface::Companion),
            other => Err(SyncError::Malformed(format!("unknown surface '{other}'"))),
        }
    }
}

/// Message class, one latest-wins slot per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageClass {
    Settings,
    TimerState,
    CompletedSession,
}

impl MessageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageClass::Settings => "settings",
            MessageClass::TimerState => "timer_state",
            MessageClass::CompletedSession => "completed_session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSync {
    pub work_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub sessions_until_long_break: u32,
    pub timestamp: DateTime<Utc>,
}

impl SettingsSync {
    pub fn from_settings(settings: &TimerSettings, timestamp: DateTime<Utc>) -> Self {
        Self {
            work_minutes: settings.work_minutes,
            short_break_minutes: settings.short_break_minutes,
            long_break_minutes: settings.long_break_minutes,
            sessions_until_long_break: settings.sessions_until_long_break,
            timestamp,
        }
    }

    pub fn to_settings(&self) -> TimerSettings {
        TimerSettings {
            work_minutes: self.work_minutes,
            short_break_minutes: self.short_break_minutes,
            long_break_minutes: self.long_break_minutes,
            sessions_until_long_break: self.sessions_until_long_break,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStateSync {
    pub kind: SessionKind,
    pub remaining_seconds: u64,
    pub is_running: bool,
    pub is_paused: bool,
    pub completed_sessions: u32,
    pub total_duration: u64,
    #[serde(default)]
    pub absolute_end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl TimerStateSync {
    pub fn from_state(state: &TimerState, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: state.kind,
            remaining_seconds: state.remaining_secs,
            is_running: state.status == TimerStatus::Running,
            is_paused: state.status == TimerStatus::Paused,
            completed_sessions: state.completed_work_sessions,
            total_duration: state.total_duration_secs,
            absolute_end_at: state.absolute_end_at,
            session_id: state.session_id,
            timestamp,
        }
    }

    pub fn status(&self) -> TimerStatus {
        if self.is_running {
            TimerStatus::Running
        } else if self.is_paused {
            TimerStatus::Paused
        } else {
            TimerStatus::Idle
        }
    }
}

/// A finished (completed or skipped) session, deduplicated by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSessionRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub kind: SessionKind,
    pub was_completed_not_skipped: bool,
    pub origin_surface: Surface,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Settings(SettingsSync),
    TimerState(TimerStateSync),
    CompletedSession(CompletedSessionRecord),
}

impl Envelope {
    pub fn class(&self) -> MessageClass {
        match self {
            Envelope::Settings(_) => MessageClass::Settings,
            Envelope::TimerState(_) => MessageClass::TimerState,
            Envelope::CompletedSession(_) => MessageClass::CompletedSession,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Envelope::Settings(s) => s.timestamp,
            Envelope::TimerState(s) => s.timestamp,
            Envelope::CompletedSession(r) => r.timestamp,
        }
    }

    /// # Errors
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// # Errors
    /// Returns [`SyncError::Malformed`] for anything that is not a complete envelope.
    pub fn decode(frame: &[u8]) -> Result<Self, SyncError> {
        serde_json::from_slice(frame).map_err(|e| SyncError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 3, 9, 0, secs).unwrap()
    }

    #[test]
    fn timer_state_envelope_keeps_every_field() {
        let env = Envelope::TimerState(TimerStateSync {
            kind: SessionKind::LongBreak,
            remaining_seconds: 412,
            is_running: true,
            is_paused: false,
            completed_sessions: 4,
            total_duration: 900,
            absolute_end_at: Some(at(40)),
            session_id: Some(Uuid::new_v4()),
            timestamp: at(12),
        });
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded, env);
        assert_eq!(decoded.class(), MessageClass::TimerState);
    }

    #[test]
    fn tag_names_are_stable() {
        let env = Envelope::Settings(SettingsSync::from_settings(&TimerSettings::default(), at(0)));
        let json: serde_json::Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "settings");
        assert_eq!(json["work_minutes"], 25);
    }

    #[test]
    fn truncated_frame_is_malformed() {
        let env = Envelope::Settings(SettingsSync::from_settings(&TimerSettings::default(), at(0)));
        let bytes = env.encode().unwrap();
        let err = Envelope::decode(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, SyncError::Malformed(_)));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let frame = br#"{"type":"timer_state","kind":"work","remaining_seconds":10}"#;
        assert!(matches!(Envelope::decode(frame), Err(SyncError::Malformed(_))));
    }

    #[test]
    fn legacy_timer_state_without_session_id_decodes() {
        let frame = br#"{"type":"timer_state","kind":"work","remaining_seconds":10,
            "is_running":false,"is_paused":true,"completed_sessions":1,
            "total_duration":1500,"timestamp":"2026-02-03T09:00:00Z"}"#;
        match Envelope::decode(frame).unwrap() {
            Envelope::TimerState(s) => {
                assert_eq!(s.status(), TimerStatus::Paused);
                assert!(s.session_id.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

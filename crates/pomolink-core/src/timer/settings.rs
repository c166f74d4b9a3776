use serde::{Deserialize, Serialize};

use super::kind::SessionKind;
use crate::error::ValidationError;

/// Maps a session kind to its countdown length.
pub trait DurationPolicy {
    fn duration_for(&self, kind: SessionKind) -> u64;
}

/// User-configured minute values and cycle length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    #[serde(default = "default_work_minutes")]
    pub work_minutes: u32,
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u32,
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u32,
    #[serde(default = "default_sessions_until_long_break")]
    pub sessions_until_long_break: u32,
}

fn default_work_minutes() -> u32 {
    SessionKind::Work.default_minutes()
}
fn default_short_break_minutes() -> u32 {
    SessionKind::ShortBreak.default_minutes()
}
fn default_long_break_minutes() -> u32 {
    SessionKind::LongBreak.default_minutes()
}
fn default_sessions_until_long_break() -> u32 {
    4
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            work_minutes: default_work_minutes(),
            short_break_minutes: default_short_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            sessions_until_long_break: default_sessions_until_long_break(),
        }
    }
}

impl TimerSettings {
    pub fn minutes_for(&self, kind: SessionKind) -> u32 {
        match kind {
            SessionKind::Work => self.work_minutes,
            SessionKind::ShortBreak => self.short_break_minutes,
            SessionKind::LongBreak => self.long_break_minutes,
        }
    }

    /// # Errors
    /// Returns an error if any duration is zero or the cycle is shorter than 2.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for kind in SessionKind::ALL {
            if self.minutes_for(kind) == 0 {
                return Err(ValidationError::InvalidValue {
                    field: format!("{}_minutes", kind.as_str()),
                    message: "must be at least 1 minute".into(),
                });
            }
        }
        if self.sessions_until_long_break < 2 {
            return Err(ValidationError::InvalidValue {
                field: "sessions_until_long_break".into(),
                message: format!("must be at least 2, got {}", self.sessions_until_long_break),
            });
        }
        Ok(())
    }
}

impl DurationPolicy for TimerSettings {
    fn duration_for(&self, kind: SessionKind) -> u64 {
        u64::from(self.minutes_for(kind)).saturating_mul(60)
    }
}

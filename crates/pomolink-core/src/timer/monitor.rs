//! Detection of configuration changes against the last known values.

use super::kind::SessionKind;
use super::settings::TimerSettings;

/// Where a settings update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOrigin {
    /// Written on this surface; must be broadcast to the peer.
    Local,
    /// Received from the peer; never re-broadcast.
    Remote,
}

/// What changed between two settings values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettingsDelta {
    pub durations: Vec<SessionKind>,
    pub cycle_changed: bool,
}

impl SettingsDelta {
    pub fn is_empty(&self) -> bool {
        self.durations.is_empty() && !self.cycle_changed
    }

    pub fn touches(&self, kind: SessionKind) -> bool {
        self.durations.contains(&kind)
    }
}

/// Remembers the last observed settings so that writes which do not change
/// anything are ignored.
#[derive(Debug, Clone)]
pub struct SettingsMonitor {
    previous: TimerSettings,
}

impl SettingsMonitor {
    pub fn new(baseline: TimerSettings) -> Self {
        Self { previous: baseline }
    }

    pub fn baseline(&self) -> &TimerSettings {
        &self.previous
    }

    /// Compares `current` with the baseline and moves the baseline forward.
    pub fn observe(&mut self, current: &TimerSettings) -> Option<SettingsDelta> {
        let delta = SettingsDelta {
            durations: SessionKind::ALL
                .into_iter()
                .filter(|k| self.previous.minutes_for(*k) != current.minutes_for(*k))
                .collect(),
            cycle_changed: self.previous.sessions_until_long_break
                != current.sessions_until_long_break,
        };
        self.previous = current.clone();
        (!delta.is_empty()).then_some(delta)
    }
}

//! Session state machine.
//!
//! The machine is wall-clock based: while Running it stores the absolute
//! instant the countdown reaches zero and derives everything else from it.
//! It has no thread of its own. The caller invokes `tick()` about once a
//! second with the run epoch it was armed with, and `recover()` whenever
//! the process comes back from suspension.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Paused -> Running -> (expiry | skip) -> Idle(next kind)
//!   ^________________ reset (from any state) _______________|
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut machine = SessionMachine::new(Surface::Primary, settings, deps);
//! machine.start();
//! let epoch = machine.run_epoch();
//! // Once per second:
//! machine.tick(epoch); // Some(Event::SessionCompleted) on expiry
//! // Hand outbound envelopes to the sync layer:
//! for envelope in machine.take_outbound() { /* ... */ }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::kind::SessionKind;
use super::monitor::{SettingsMonitor, SettingsOrigin};
use super::rollover::apply_rollover;
use super::settings::{DurationPolicy, TimerSettings};
use super::state::{PersistedTimer, TimerState, TimerStatus};
use crate::clock::Clock;
use crate::events::Event;
use crate::ports::{Notifier, SessionStore};
use crate::sync::{CompletedSessionRecord, Envelope, SettingsSync, Surface, TimerStateSync};

/// Collaborators injected into a machine.
#[derive(Clone)]
pub struct MachineDeps {
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn SessionStore>,
}

/// Single owner of one surface's timer state.
pub struct SessionMachine {
    state: TimerState,
    settings: TimerSettings,
    monitor: SettingsMonitor,
    origin: Surface,
    deps: MachineDeps,
    /// Newest of: last local action, last applied remote state.
    last_action_at: Option<DateTime<Utc>>,
    last_settings_at: Option<DateTime<Utc>>,
    /// Bumped on every entry into and exit from Running; ticks carrying an
    /// older epoch are ignored.
    run_epoch: u64,
    outbox: Vec<Envelope>,
}

impl SessionMachine {
    /// Create a first-run machine: idle, on a work session.
    pub fn new(origin: Surface, settings: TimerSettings, deps: MachineDeps) -> Self {
        Self {
            state: TimerState::idle(&settings),
            monitor: SettingsMonitor::new(settings.clone()),
            settings,
            origin,
            deps,
            last_action_at: None,
            last_settings_at: None,
            run_epoch: 0,
            outbox: Vec::new(),
        }
    }

    /// Rebuild a machine from persisted fields.
    ///
    /// Idle timers pick up the current configuration. Call
    /// [`check_rollover`](Self::check_rollover) and [`recover`](Self::recover)
    /// afterwards to finish process-start handling.
    pub fn restore(
        origin: Surface,
        settings: TimerSettings,
        persisted: PersistedTimer,
        deps: MachineDeps,
    ) -> Self {
        let mut machine = Self::new(origin, settings, deps);
        let PersistedTimer {
            mut state,
            last_action_at,
            last_settings_at,
        } = persisted;

        match state.status {
            TimerStatus::Running if state.absolute_end_at.is_none() => {
                warn!(kind = ?state.kind, "persisted running timer has no end time, resetting");
                state.make_idle(state.kind, &machine.settings);
            }
            TimerStatus::Idle => state.make_idle(state.kind, &machine.settings),
            TimerStatus::Paused => state.absolute_end_at = None,
            TimerStatus::Running => {}
        }

        machine.state = state;
        machine.last_action_at = last_action_at;
        machine.last_settings_at = last_settings_at;
        machine
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    pub fn origin(&self) -> Surface {
        self.origin
    }

    pub fn status(&self) -> TimerStatus {
        self.state.status
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn run_epoch(&self) -> u64 {
        self.run_epoch
    }

    pub fn last_action_at(&self) -> Option<DateTime<Utc>> {
        self.last_action_at
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.deps.clock.now()
    }

    pub fn persisted(&self) -> PersistedTimer {
        PersistedTimer {
            state: self.state.clone(),
            last_action_at: self.last_action_at,
            last_settings_at: self.last_settings_at,
        }
    }

    /// Current state as a sync payload, with remaining time re-derived.
    pub fn state_sync(&self) -> TimerStateSync {
        let now = self.now();
        let mut state = self.state.clone();
        state.remaining_secs = state.remaining_at(now);
        TimerStateSync::from_state(&state, now)
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        let now = self.now();
        let mut state = self.state.clone();
        state.remaining_secs = state.remaining_at(now);
        Event::StateSnapshot {
            status: state.status,
            kind: state.kind,
            label: state.kind.label().to_string(),
            remaining_secs: state.remaining_secs,
            total_secs: state.total_duration_secs,
            progress: state.progress(),
            completed_work_sessions: state.completed_work_sessions,
            ends_at: state.absolute_end_at,
            at: now,
        }
    }

    /// Envelopes produced since the last call, oldest first.
    pub fn take_outbound(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Option<Event> {
        if self.state.is_running() {
            return None;
        }
        let now = self.now();
        self.roll_over(now);

        let resumed = self.state.status == TimerStatus::Paused;
        if !resumed {
            let duration = self.settings.duration_for(self.state.kind);
            self.state.remaining_secs = duration;
            self.state.total_duration_secs = duration;
            self.state.session_id = Some(Uuid::new_v4());
            self.state.session_started_at = None;
        }

        let remaining = self.state.remaining_secs;
        let Some(ends_at) = now.checked_add_signed(secs(remaining)) else {
            warn!(remaining, "session end is out of range, not starting");
            return None;
        };
        self.state.status = TimerStatus::Running;
        self.state.absolute_end_at = Some(ends_at);
        self.state.session_started_at.get_or_insert(now);
        self.state.session_id.get_or_insert_with(Uuid::new_v4);
        self.run_epoch += 1;
        self.deps
            .notifier
            .schedule_completion(self.state.kind, remaining);
        self.touch(now);

        debug!(kind = ?self.state.kind, remaining, resumed, "timer started");
        Some(Event::TimerStarted {
            kind: self.state.kind,
            remaining_secs: remaining,
            resumed,
            ends_at,
            at: now,
        })
    }

    pub fn pause(&mut self) -> Option<Event> {
        if !self.state.is_running() {
            return None;
        }
        let now = self.now();
        if self.state.has_expired(now) {
            return Some(self.finish_session(true));
        }

        self.state.remaining_secs = self.state.remaining_at(now);
        self.state.absolute_end_at = None;
        self.state.status = TimerStatus::Paused;
        self.run_epoch += 1;
        self.deps.notifier.cancel_all();
        self.touch(now);

        debug!(kind = ?self.state.kind, remaining = self.state.remaining_secs, "timer paused");
        Some(Event::TimerPaused {
            kind: self.state.kind,
            remaining_secs: self.state.remaining_secs,
            at: now,
        })
    }

    /// Valid from any state; returns to idle at the current kind's full length.
    pub fn reset(&mut self) -> Option<Event> {
        let now = self.now();
        if self.state.is_running() {
            self.deps.notifier.cancel_all();
        }
        self.run_epoch += 1;
        let kind = self.state.kind;
        self.state.make_idle(kind, &self.settings);
        self.touch(now);

        debug!(?kind, "timer reset");
        Some(Event::TimerReset { kind, at: now })
    }

    pub fn change_kind(&mut self, kind: SessionKind) -> Option<Event> {
        if self.state.status != TimerStatus::Idle || kind == self.state.kind {
            return None;
        }
        let now = self.now();
        let from = self.state.kind;
        self.state.make_idle(kind, &self.settings);
        self.touch(now);

        debug!(?from, to = ?kind, "session kind changed");
        Some(Event::KindChanged { from, to: kind, at: now })
    }

    /// End the current session without counting it toward the tally.
    pub fn skip(&mut self) -> Option<Event> {
        match self.state.status {
            TimerStatus::Idle => None,
            // A session already past its end ran to completion.
            TimerStatus::Running if self.state.has_expired(self.now()) => {
                Some(self.finish_session(true))
            }
            TimerStatus::Running | TimerStatus::Paused => Some(self.finish_session(false)),
        }
    }

    /// Call about once per second with the epoch the ticker was armed with.
    pub fn tick(&mut self, epoch: u64) -> Option<Event> {
        if epoch != self.run_epoch || !self.state.is_running() {
            return None;
        }
        let now = self.now();
        if self.state.has_expired(now) {
            return self.on_expiry();
        }
        self.state.remaining_secs = self.state.remaining_at(now);
        None
    }

    /// Complete the running session if its end time has passed.
    ///
    /// Safe to call repeatedly: once the machine has left Running, further
    /// calls are no-ops.
    pub fn on_expiry(&mut self) -> Option<Event> {
        if !self.state.has_expired(self.now()) {
            return None;
        }
        Some(self.finish_session(true))
    }

    /// Suspend/resume recovery.
    pub fn recover(&mut self) -> Option<Event> {
        if !self.state.is_running() {
            return None;
        }
        let now = self.now();
        if self.state.has_expired(now) {
            debug!(kind = ?self.state.kind, "session expired while suspended");
            return self.on_expiry();
        }
        self.state.remaining_secs = self.state.remaining_at(now);
        None
    }

    /// Process-start rollover of the completed-work tally.
    pub fn check_rollover(&mut self) -> Option<Event> {
        let now = self.now();
        self.roll_over(now)
            .map(|discarded| Event::TallyRolledOver { discarded, at: now })
    }

    /// Reconcile a configuration change.
    ///
    /// An idle timer redisplays immediately; a running or paused session
    /// keeps the baseline it started with. Local changes are broadcast,
    /// remote ones are not.
    pub fn update_settings(
        &mut self,
        settings: TimerSettings,
        origin: SettingsOrigin,
    ) -> Option<Event> {
        if let Err(e) = settings.validate() {
            warn!(error = %e, ?origin, "rejecting invalid timer settings");
            return None;
        }
        let now = self.now();
        let delta = self.monitor.observe(&settings)?;
        self.settings = settings;

        let display_updated =
            self.state.status == TimerStatus::Idle && delta.touches(self.state.kind);
        if display_updated {
            let kind = self.state.kind;
            self.state.make_idle(kind, &self.settings);
        }

        let remote = origin == SettingsOrigin::Remote;
        if !remote {
            self.last_settings_at = Some(now);
            self.outbox
                .push(Envelope::Settings(SettingsSync::from_settings(&self.settings, now)));
        }

        debug!(?delta, remote, display_updated, "settings changed");
        Some(Event::SettingsApplied {
            remote,
            display_updated,
            at: now,
        })
    }

    pub fn apply_remote_settings(&mut self, sync: &SettingsSync) -> Option<Event> {
        if self.last_settings_at.is_some_and(|mark| sync.timestamp <= mark) {
            debug!(timestamp = %sync.timestamp, "ignoring stale remote settings");
            return None;
        }
        let settings = sync.to_settings();
        if let Err(e) = settings.validate() {
            warn!(error = %e, timestamp = %sync.timestamp, "rejecting invalid remote settings");
            return None;
        }
        self.last_settings_at = Some(sync.timestamp);
        self.update_settings(settings, SettingsOrigin::Remote)
    }

    /// Adopt a peer's timer state if it is newer than anything seen locally.
    pub fn apply_remote_state(&mut self, from: Surface, sync: &TimerStateSync) -> Option<Event> {
        if self.last_action_at.is_some_and(|mark| sync.timestamp <= mark) {
            debug!(timestamp = %sync.timestamp, "ignoring stale remote timer state");
            return None;
        }
        if !durations_in_range(sync) {
            warn!(
                remaining = sync.remaining_seconds,
                total = sync.total_duration,
                "discarding remote timer state with out-of-range durations"
            );
            return None;
        }
        let now = self.now();
        let was_running = self.state.is_running();
        let same_session = sync.session_id.is_some() && sync.session_id == self.state.session_id;
        self.last_action_at = Some(sync.timestamp);
        self.run_epoch += 1;

        self.state.kind = sync.kind;
        self.state.completed_work_sessions = sync.completed_sessions;
        self.state.last_active_day = Some(self.deps.clock.local_day(sync.timestamp));
        self.roll_over(now);

        let total = if sync.total_duration > 0 {
            sync.total_duration
        } else {
            self.settings.duration_for(sync.kind)
        };

        match (sync.status(), sync.absolute_end_at) {
            (TimerStatus::Running, Some(ends_at)) => {
                if !same_session {
                    self.state.session_started_at = None;
                    self.state.session_id = sync.session_id.or_else(|| Some(Uuid::new_v4()));
                }
                self.state.status = TimerStatus::Running;
                self.state.total_duration_secs = total;
                self.state.absolute_end_at = Some(ends_at);
                self.state.remaining_secs = self.state.remaining_at(now);

                if self.state.has_expired(now) {
                    debug!(kind = ?sync.kind, "remote session already expired");
                    return Some(self.finish_session(true));
                }
                self.deps
                    .notifier
                    .schedule_completion(self.state.kind, self.state.remaining_secs);
            }
            (TimerStatus::Running, None) | (TimerStatus::Paused, _) => {
                if was_running {
                    self.deps.notifier.cancel_all();
                }
                if !same_session {
                    self.state.session_started_at = None;
                    self.state.session_id = sync.session_id;
                }
                self.state.status = TimerStatus::Paused;
                self.state.total_duration_secs = total;
                self.state.remaining_secs = sync.remaining_seconds;
                self.state.absolute_end_at = None;
            }
            (TimerStatus::Idle, _) => {
                if was_running {
                    self.deps.notifier.cancel_all();
                }
                self.state.make_idle(sync.kind, &self.settings);
            }
        }

        debug!(?from, status = ?self.state.status, kind = ?self.state.kind, "applied remote timer state");
        Some(Event::RemoteStateApplied {
            from,
            status: self.state.status,
            kind: self.state.kind,
            at: now,
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Shared tail of expiry and skip: record, count, advance, go idle.
    fn finish_session(&mut self, completed: bool) -> Event {
        let now = self.now();
        if self.state.is_running() {
            self.deps.notifier.cancel_all();
        }
        self.run_epoch += 1;

        let kind = self.state.kind;
        let (ended_at, duration_seconds) = if completed {
            (
                self.state.absolute_end_at.unwrap_or(now),
                self.state.total_duration_secs,
            )
        } else {
            let remaining = self.state.remaining_at(now);
            (now, self.state.total_duration_secs.saturating_sub(remaining))
        };
        let record = CompletedSessionRecord {
            id: self.state.session_id.unwrap_or_else(Uuid::new_v4),
            started_at: self
                .state
                .session_started_at
                .or_else(|| ended_at.checked_sub_signed(secs(duration_seconds)))
                .unwrap_or(ended_at),
            ended_at,
            duration_seconds,
            kind,
            was_completed_not_skipped: completed,
            origin_surface: self.origin,
            timestamp: now,
        };

        if let Err(e) = self.deps.store.append(&record) {
            warn!(error = %e, id = %record.id, "failed to store completed session");
        }
        self.outbox.push(Envelope::CompletedSession(record.clone()));

        if completed && kind == SessionKind::Work {
            self.roll_over(now);
            self.state.completed_work_sessions += 1;
        }
        let next_kind = kind.next(
            self.state.completed_work_sessions,
            self.settings.sessions_until_long_break,
        );
        self.state.make_idle(next_kind, &self.settings);
        self.touch(now);

        info!(
            ?kind,
            ?next_kind,
            completed,
            duration_seconds,
            tally = self.state.completed_work_sessions,
            "session finished"
        );
        Event::SessionCompleted {
            record,
            next_kind,
            completed_work_sessions: self.state.completed_work_sessions,
            at: now,
        }
    }

    fn roll_over(&mut self, now: DateTime<Utc>) -> Option<u32> {
        let today = self.deps.clock.local_day(now);
        let discarded = apply_rollover(
            &mut self.state.completed_work_sessions,
            &mut self.state.last_active_day,
            today,
        )?;
        if discarded > 0 {
            info!(discarded, %today, "new day, completed-session tally reset");
        }
        Some(discarded)
    }

    /// Record a local action and queue the resulting state for the peer.
    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_action_at = Some(self.last_action_at.map_or(now, |mark| mark.max(now)));
        self.outbox
            .push(Envelope::TimerState(TimerStateSync::from_state(&self.state, now)));
    }
}

/// Longest session the settings can describe.
const MAX_SESSION_SECS: u64 = u32::MAX as u64 * 60;

fn durations_in_range(sync: &TimerStateSync) -> bool {
    sync.total_duration <= MAX_SESSION_SECS
        && sync.remaining_seconds <= MAX_SESSION_SECS
        && (sync.total_duration == 0 || sync.remaining_seconds <= sync.total_duration)
}

fn secs(n: u64) -> Duration {
    Duration::seconds(i64::try_from(n).unwrap_or(i64::MAX / 1000))
}

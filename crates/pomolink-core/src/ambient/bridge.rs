//! Storage-mediated link between the primary surface and the ambient display.
//!
//! Outbound: a snapshot is written on every user-visible transition and at
//! a fixed period while running. Inbound: a pending action token is polled,
//! cleared, then applied, so a token is applied at most once.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::storage::{AmbientAction, AmbientSnapshot, AmbientStorage};
use crate::events::Event;
use crate::timer::{SessionMachine, TimerStatus};

pub struct AmbientBridge {
    storage: Arc<dyn AmbientStorage>,
    snapshot_interval: Duration,
    /// Set when a session starts running, cleared on natural completion.
    polling: bool,
    foreground: bool,
    last_written_at: Option<DateTime<Utc>>,
}

impl AmbientBridge {
    pub fn new(storage: Arc<dyn AmbientStorage>, snapshot_interval: Duration) -> Self {
        Self {
            storage,
            snapshot_interval,
            polling: false,
            foreground: false,
            last_written_at: None,
        }
    }

    pub fn storage(&self) -> &Arc<dyn AmbientStorage> {
        &self.storage
    }

    /// Align polling with a freshly restored machine and publish its state.
    pub fn attach(&mut self, machine: &SessionMachine) {
        self.polling = machine.is_running();
        self.write(machine);
    }

    /// Whether the pending-action location should be polled right now.
    pub fn should_poll(&self) -> bool {
        self.polling || self.foreground
    }

    pub fn set_foreground(&mut self, foreground: bool) {
        self.foreground = foreground;
    }

    /// React to a machine event.
    pub fn observe(&mut self, event: &Event, machine: &SessionMachine) {
        match event {
            Event::TimerStarted { .. } => self.polling = true,
            Event::RemoteStateApplied {
                status: TimerStatus::Running,
                ..
            } => self.polling = true,
            Event::SessionCompleted { record, .. } if record.was_completed_not_skipped => {
                self.polling = false
            }
            _ => {}
        }
        if event.refreshes_ambient() {
            self.write(machine);
        }
    }

    /// Periodic refresh while running. Returns true if a snapshot was written.
    pub fn refresh_if_stale(&mut self, machine: &SessionMachine) -> bool {
        if !machine.is_running() {
            return false;
        }
        let now = machine.now();
        let stale = self
            .last_written_at
            .map_or(true, |last| now - last >= self.snapshot_interval);
        if stale {
            self.write(machine);
        }
        stale
    }

    /// Consume and apply a pending action token, if there is one.
    pub fn poll_once(&mut self, machine: &mut SessionMachine) -> Option<Event> {
        let pending = match self.storage.read_pending_action() {
            Ok(pending) => pending?,
            Err(e) => {
                warn!(error = %e, "failed to read ambient action");
                return None;
            }
        };
        if let Err(e) = self.storage.clear_pending_action() {
            warn!(error = %e, action = pending.action.as_str(), "failed to clear ambient action, not applying");
            return None;
        }

        debug!(action = pending.action.as_str(), requested_at = %pending.requested_at, "applying ambient action");
        let event = match pending.action {
            AmbientAction::Play => machine.start(),
            AmbientAction::Pause => machine.pause(),
            AmbientAction::Reset => machine.reset(),
            AmbientAction::Skip => machine.skip(),
        };
        if let Some(event) = &event {
            self.observe(event, machine);
        }
        event
    }

    fn write(&mut self, machine: &SessionMachine) {
        let now = machine.now();
        let snapshot = AmbientSnapshot::from_state(machine.state(), now);
        match self.storage.write_snapshot(&snapshot) {
            Ok(()) => self.last_written_at = Some(now),
            Err(e) => warn!(error = %e, "failed to write ambient snapshot"),
        }
    }
}

//! One surface's timer together with its side channels.
//!
//! A `SurfaceSession` owns the state machine and routes its effects: sync
//! envelopes to the peer, snapshots to the ambient display, state to disk.
//! Both the async runtime and the one-shot CLI drive a surface through it.

use std::sync::Arc;

use tracing::warn;

use crate::ambient::AmbientBridge;
use crate::events::Event;
use crate::ports::StatePersistence;
use crate::sync::SyncProtocol;
use crate::timer::{SessionKind, SessionMachine, SettingsOrigin, TimerSettings};

/// A user-initiated operation on the timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Reset,
    Skip,
    ChangeKind(SessionKind),
    /// A local configuration write.
    UpdateSettings(TimerSettings),
    /// The process came back from suspension.
    Recover,
}

pub struct SurfaceSession {
    machine: SessionMachine,
    protocol: SyncProtocol,
    ambient: Option<AmbientBridge>,
    persistence: Option<Arc<dyn StatePersistence>>,
    dirty: bool,
}

impl SurfaceSession {
    pub fn new(machine: SessionMachine, protocol: SyncProtocol) -> Self {
        Self {
            machine,
            protocol,
            ambient: None,
            persistence: None,
            dirty: false,
        }
    }

    pub fn with_ambient(mut self, mut bridge: AmbientBridge) -> Self {
        bridge.attach(&self.machine);
        self.ambient = Some(bridge);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn StatePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn protocol(&self) -> &SyncProtocol {
        &self.protocol
    }

    pub fn ambient(&self) -> Option<&AmbientBridge> {
        self.ambient.as_ref()
    }

    /// Process-start handling: daily rollover, then suspend/resume recovery.
    pub fn start_up(&mut self) -> Vec<Event> {
        let rolled = self.machine.check_rollover();
        let recovered = self.machine.recover();
        rolled
            .into_iter()
            .chain(recovered)
            .inspect(|event| self.after(event))
            .collect()
    }

    pub fn dispatch(&mut self, command: Command) -> Option<Event> {
        let event = match command {
            Command::Start => self.machine.start(),
            Command::Pause => self.machine.pause(),
            Command::Reset => self.machine.reset(),
            Command::Skip => self.machine.skip(),
            Command::ChangeKind(kind) => self.machine.change_kind(kind),
            Command::UpdateSettings(settings) => {
                self.machine.update_settings(settings, SettingsOrigin::Local)
            }
            Command::Recover => self.machine.recover(),
        }?;
        self.after(&event);
        Some(event)
    }

    /// Apply one inbound frame from the peer.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Option<Event> {
        let event = self.protocol.route(frame, &mut self.machine)?;
        self.after(&event);
        Some(event)
    }

    /// Pull frames from poll-driven transports into the receive handler.
    pub fn poll_transport(&self) {
        if let Err(e) = self.protocol.transport().poll() {
            warn!(error = %e, "transport poll failed");
        }
    }

    /// Whether the ambient action token should be polled now.
    pub fn should_poll_ambient(&self) -> bool {
        self.ambient.as_ref().is_some_and(AmbientBridge::should_poll)
    }

    /// Consume a pending ambient action, if polling is active.
    pub fn poll_ambient(&mut self) -> Option<Event> {
        let bridge = self.ambient.as_mut().filter(|b| b.should_poll())?;
        let event = bridge.poll_once(&mut self.machine)?;
        self.dirty = true;
        Some(event)
    }

    /// Foreground transitions poll the ambient token immediately.
    pub fn set_foreground(&mut self, foreground: bool) -> Option<Event> {
        let bridge = self.ambient.as_mut()?;
        bridge.set_foreground(foreground);
        if foreground {
            self.poll_ambient()
        } else {
            None
        }
    }

    pub fn tick(&mut self, epoch: u64) -> Option<Event> {
        let event = self.machine.tick(epoch);
        if let Some(event) = &event {
            self.after(event);
        }
        if let Some(bridge) = self.ambient.as_mut() {
            bridge.refresh_if_stale(&self.machine);
        }
        event
    }

    pub fn snapshot(&self) -> Event {
        self.machine.snapshot()
    }

    /// Publish pending envelopes and persist the timer if it changed.
    /// Returns the number of envelopes published.
    pub fn flush(&mut self) -> usize {
        let outbound = self.machine.take_outbound();
        let count = outbound.len();
        self.protocol.publish_all(outbound);

        if self.dirty {
            if let Some(persistence) = &self.persistence {
                if let Err(e) = persistence.save_timer(&self.machine.persisted()) {
                    warn!(error = %e, "failed to persist timer state");
                    return count;
                }
            }
            self.dirty = false;
        }
        count
    }

    fn after(&mut self, event: &Event) {
        self.dirty = true;
        if let Some(bridge) = self.ambient.as_mut() {
            bridge.observe(event, &self.machine);
        }
    }
}

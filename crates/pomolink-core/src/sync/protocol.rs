//! Routing of envelopes between a state machine and a peer transport.
//!
//! Outbound, each message class is mapped to its delivery mode. Inbound,
//! frames are decoded and handed to the machine's conflict-checked
//! application paths; completed-session records go straight to the store.
//! Nothing here ever blocks or fails a state transition: send errors are
//! logged and dropped.

use std::sync::Arc;

use tracing::{debug, warn};

use super::envelope::{Envelope, MessageClass, Surface};
use super::transport::PeerTransport;
use crate::events::Event;
use crate::ports::SessionStore;
use crate::timer::SessionMachine;

pub struct SyncProtocol {
    transport: Arc<dyn PeerTransport>,
    store: Arc<dyn SessionStore>,
    local: Surface,
}

impl SyncProtocol {
    pub fn new(local: Surface, transport: Arc<dyn PeerTransport>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            transport,
            store,
            local,
        }
    }

    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    /// Send one envelope using the delivery mode of its class.
    pub fn publish(&self, envelope: &Envelope) {
        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, class = envelope.class().as_str(), "failed to encode envelope");
                return;
            }
        };

        match envelope.class() {
            MessageClass::Settings => {
                if let Err(e) = self
                    .transport
                    .broadcast_latest_wins(MessageClass::Settings, &frame)
                {
                    warn!(error = %e, "settings broadcast failed");
                }
            }
            MessageClass::TimerState => {
                if let Err(e) = self
                    .transport
                    .broadcast_latest_wins(MessageClass::TimerState, &frame)
                {
                    warn!(error = %e, "timer state broadcast failed");
                }
                if self.transport.is_reachable() {
                    if let Err(e) = self.transport.send_best_effort(&frame) {
                        warn!(error = %e, "realtime timer state send failed");
                    }
                }
            }
            MessageClass::CompletedSession => {
                if let Err(e) = self.transport.enqueue_reliable(&frame) {
                    warn!(error = %e, "failed to queue completed session");
                }
            }
        }
    }

    pub fn publish_all(&self, envelopes: impl IntoIterator<Item = Envelope>) {
        for envelope in envelopes {
            self.publish(&envelope);
        }
    }

    /// Decode an inbound frame and apply it.
    ///
    /// Malformed frames are dropped and the machine keeps its state.
    pub fn route(&self, frame: &[u8], machine: &mut SessionMachine) -> Option<Event> {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "dropping malformed frame");
                return None;
            }
        };

        let from = self.local.peer();
        match envelope {
            Envelope::Settings(sync) => machine.apply_remote_settings(&sync),
            Envelope::TimerState(sync) => machine.apply_remote_state(from, &sync),
            Envelope::CompletedSession(record) => {
                match self.store.append(&record) {
                    Ok(true) => debug!(id = %record.id, "stored remote session"),
                    Ok(false) => debug!(id = %record.id, "duplicate session ignored"),
                    Err(e) => warn!(error = %e, id = %record.id, "failed to store remote session"),
                }
                None
            }
        }
    }
}

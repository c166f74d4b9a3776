//! Peer transport abstraction and the in-process loopback pair.
//!
//! A transport moves opaque frames between the two surfaces using one of
//! three delivery modes:
//!
//! - latest-wins: one slot per message class, overwritten on every send and
//!   re-delivered whenever the peer (re)connects
//! - best-effort: immediate, fails with [`SyncError::Unreachable`] if the
//!   peer is not connected, never retried
//! - reliable: queued until the peer is reachable, delivered once

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::envelope::MessageClass;
use crate::error::SyncError;

/// Called once per inbound frame.
pub type FrameHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

pub trait PeerTransport: Send + Sync {
    fn broadcast_latest_wins(&self, class: MessageClass, frame: &[u8]) -> Result<(), SyncError>;
    fn send_best_effort(&self, frame: &[u8]) -> Result<(), SyncError>;
    fn enqueue_reliable(&self, frame: &[u8]) -> Result<(), SyncError>;
    fn is_reachable(&self) -> bool;
    /// Replaces any previously registered handler.
    fn on_receive(&self, handler: FrameHandler);

    /// Pull pending frames for transports that are not push-based.
    /// Returns the number of frames handed to the handler.
    fn poll(&self) -> Result<usize, SyncError> {
        Ok(0)
    }
}

/// Buffer of inbound frames, filled by a transport handler.
#[derive(Clone, Default)]
pub struct Inbox {
    frames: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl Inbox {
    /// Register a new inbox as `transport`'s receive handler.
    pub fn attach(transport: &dyn PeerTransport) -> Self {
        let inbox = Self::default();
        let sink = inbox.clone();
        transport.on_receive(Arc::new(move |frame| sink.push(frame)));
        inbox
    }

    pub fn push(&self, frame: Vec<u8>) {
        self.lock().push_back(frame);
    }

    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Default)]
struct Endpoint {
    handler: Option<FrameHandler>,
    /// Latest-wins slots this endpoint has sent.
    slots: HashMap<MessageClass, Vec<u8>>,
    /// Reliable frames waiting for the peer.
    outbound: VecDeque<Vec<u8>>,
}

struct Link {
    connected: bool,
    ends: [Endpoint; 2],
}

type Delivery = (FrameHandler, Vec<Vec<u8>>);

impl Link {
    /// Frames `from` owes its peer on (re)connect.
    fn pending_for_peer(&mut self, from: usize) -> Option<Delivery> {
        let to = 1 - from;
        let handler = self.ends[to].handler.clone()?;
        let sender = &mut self.ends[from];
        let mut frames: Vec<Vec<u8>> = sender.slots.values().cloned().collect();
        frames.extend(sender.outbound.drain(..));
        Some((handler, frames))
    }
}

fn deliver(deliveries: impl IntoIterator<Item = Delivery>) {
    for (handler, frames) in deliveries {
        for frame in frames {
            handler(frame);
        }
    }
}

/// Connect/disconnect control for a loopback pair.
#[derive(Clone)]
pub struct LoopbackLink {
    link: Arc<Mutex<Link>>,
}

impl LoopbackLink {
    pub fn set_connected(&self, connected: bool) {
        let deliveries = {
            let mut link = lock(&self.link);
            let reconnect = connected && !link.connected;
            link.connected = connected;
            if reconnect {
                [0, 1]
                    .into_iter()
                    .filter_map(|side| link.pending_for_peer(side))
                    .collect()
            } else {
                Vec::new()
            }
        };
        deliver(deliveries);
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).connected
    }
}

/// One end of an in-process transport pair.
pub struct LoopbackTransport {
    link: Arc<Mutex<Link>>,
    side: usize,
}

impl LoopbackTransport {
    /// Two connected ends plus the link control.
    pub fn pair() -> (LoopbackTransport, LoopbackTransport, LoopbackLink) {
        let link = Arc::new(Mutex::new(Link {
            connected: true,
            ends: [Endpoint::default(), Endpoint::default()],
        }));
        (
            LoopbackTransport {
                link: link.clone(),
                side: 0,
            },
            LoopbackTransport {
                link: link.clone(),
                side: 1,
            },
            LoopbackLink { link },
        )
    }

    fn peer_handler(link: &Link, side: usize) -> Option<FrameHandler> {
        if !link.connected {
            return None;
        }
        link.ends[1 - side].handler.clone()
    }
}

impl PeerTransport for LoopbackTransport {
    fn broadcast_latest_wins(&self, class: MessageClass, frame: &[u8]) -> Result<(), SyncError> {
        let handler = {
            let mut link = lock(&self.link);
            link.ends[self.side].slots.insert(class, frame.to_vec());
            Self::peer_handler(&link, self.side)
        };
        if let Some(handler) = handler {
            handler(frame.to_vec());
        }
        Ok(())
    }

    fn send_best_effort(&self, frame: &[u8]) -> Result<(), SyncError> {
        let handler = Self::peer_handler(&lock(&self.link), self.side);
        let handler = handler.ok_or(SyncError::Unreachable)?;
        handler(frame.to_vec());
        Ok(())
    }

    fn enqueue_reliable(&self, frame: &[u8]) -> Result<(), SyncError> {
        let handler = {
            let mut link = lock(&self.link);
            let handler = Self::peer_handler(&link, self.side);
            if handler.is_none() {
                link.ends[self.side].outbound.push_back(frame.to_vec());
            }
            handler
        };
        if let Some(handler) = handler {
            handler(frame.to_vec());
        }
        Ok(())
    }

    fn is_reachable(&self) -> bool {
        Self::peer_handler(&lock(&self.link), self.side).is_some()
    }

    fn on_receive(&self, handler: FrameHandler) {
        let delivery = {
            let mut link = lock(&self.link);
            link.ends[self.side].handler = Some(handler);
            if link.connected {
                link.pending_for_peer(1 - self.side)
            } else {
                None
            }
        };
        deliver(delivery);
    }
}

fn lock(link: &Mutex<Link>) -> MutexGuard<'_, Link> {
    link.lock().unwrap_or_else(|e| e.into_inner())
}

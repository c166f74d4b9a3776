//! Peer synchronization between the primary and companion surfaces.
//!
//! Envelopes are timestamped JSON frames. Transports implement the three
//! delivery modes; the protocol picks the mode per message class and
//! routes inbound frames into the state machine.

pub mod envelope;
pub mod mailbox;
pub mod protocol;
pub mod transport;

pub use envelope::{
    CompletedSessionRecord, Envelope, MessageClass, SettingsSync, Surface, TimerStateSync,
};
pub use mailbox::MailboxTransport;
pub use protocol::SyncProtocol;
pub use transport::{FrameHandler, Inbox, LoopbackLink, LoopbackTransport, PeerTransport};

//! # Pomolink Core Library
//!
//! This library provides the core logic for a work/break interval timer
//! that stays consistent across three surfaces: the primary process, a
//! companion process (e.g. a wearable), and an ambient display. Each
//! process owns its own timer; they converge through timestamped messages.
//!
//! ## Architecture
//!
//! - **Timer**: A wall-clock-based state machine. While running, only the
//!   absolute end instant is trusted; remaining time is derived from it, so
//!   suspension of any length is recovered correctly
//! - **Sync**: Typed envelopes, three delivery modes and last-writer-wins
//!   conflict resolution between surfaces
//! - **Ambient**: Snapshot plus pending-action token exchanged through
//!   shared storage
//! - **Storage**: SQLite-based session storage and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`SessionMachine`]: Core timer state machine
//! - [`SurfaceSession`]: A machine wired to its sync, ambient and storage sides
//! - [`SurfaceRuntime`]: Async event loop driving one surface
//! - [`Database`]: Session and statistics persistence
//! - [`Config`]: Application configuration management

pub mod ambient;
pub mod clock;
pub mod error;
pub mod events;
pub mod ports;
pub mod runtime;
pub mod storage;
pub mod surface;
pub mod sync;
pub mod timer;

pub use ambient::{AmbientAction, AmbientBridge, AmbientStorage, FileAmbientStorage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, StorageError, SyncError, ValidationError};
pub use events::Event;
pub use ports::{MemorySessionStore, NoopNotifier, Notifier, SessionStore, StatePersistence};
pub use runtime::{RuntimeConfig, RuntimeHandle, SurfaceRuntime};
pub use storage::{Config, Database, DayStats};
pub use surface::{Command, SurfaceSession};
pub use sync::{
    CompletedSessionRecord, Envelope, LoopbackTransport, MailboxTransport, PeerTransport,
    Surface, SyncProtocol, TimerStateSync,
};
pub use timer::{
    MachineDeps, PersistedTimer, SessionKind, SessionMachine, TimerSettings, TimerState,
    TimerStatus,
};

//! Cross-process transport over a shared SQLite file.
//!
//! Tables:
//! - `latest`: one row per sender and message class, overwritten on send
//! - `queue`: reliable and realtime frames, deleted once delivered
//! - `presence`: heartbeat per surface, written on every poll
//!
//! Receiving is poll-driven. The first poll after opening delivers every
//! latest-wins row of the peer; later polls only deliver rows whose
//! revision changed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use super::envelope::{MessageClass, Surface};
use super::transport::{FrameHandler, PeerTransport};
use crate::clock::{Clock, SystemClock};
use crate::error::SyncError;

pub struct MailboxTransport {
    conn: Mutex<Connection>,
    surface: Surface,
    clock: Arc<dyn Clock>,
    reachability_window: Duration,
    handler: Mutex<Option<FrameHandler>>,
    /// Revision of each peer latest-wins row already delivered.
    seen: Mutex<HashMap<String, i64>>,
}

impl MailboxTransport {
    /// # Errors
    /// Returns an error if the file cannot be opened or the schema created.
    pub fn open(path: &Path, surface: Surface) -> Result<Self, SyncError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(2))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS latest (
                sender   TEXT NOT NULL,
                class    TEXT NOT NULL,
                frame    BLOB NOT NULL,
                revision INTEGER NOT NULL,
                PRIMARY KEY (sender, class)
            );

            CREATE TABLE IF NOT EXISTS queue (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient TEXT NOT NULL,
                frame     BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS presence (
                surface TEXT PRIMARY KEY,
                seen_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            surface,
            clock: Arc::new(SystemClock),
            reachability_window: Duration::seconds(10),
            handler: Mutex::new(None),
            seen: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reachability_window(mut self, window: Duration) -> Self {
        self.reachability_window = window;
        self
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Transport("mailbox connection poisoned".into()))
    }

    /// Write this surface's heartbeat.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn heartbeat(&self) -> Result<(), SyncError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO presence (surface, seen_at) VALUES (?1, ?2)",
            params![self.surface.as_str(), self.clock.now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Without a handler, queued frames stay in the mailbox.
    fn drain_mailbox(&self) -> Result<usize, SyncError> {
        self.heartbeat()?;
        let Some(handler) = self
            .handler
            .lock()
            .map_err(|_| SyncError::Transport("handler slot poisoned".into()))?
            .clone()
        else {
            return Ok(0);
        };

        let frames = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let mut frames = Vec::new();

            {
                let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
                let mut stmt =
                    tx.prepare("SELECT class, frame, revision FROM latest WHERE sender = ?1")?;
                let rows = stmt.query_map(params![self.surface.peer().as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?;
                for row in rows {
                    let (class, frame, revision) = row?;
                    if seen.get(&class) != Some(&revision) {
                        seen.insert(class, revision);
                        frames.push(frame);
                    }
                }
            }

            {
                let mut stmt =
                    tx.prepare("SELECT frame FROM queue WHERE recipient = ?1 ORDER BY id")?;
                let rows = stmt.query_map(params![self.surface.as_str()], |row| {
                    row.get::<_, Vec<u8>>(0)
                })?;
                for row in rows {
                    frames.push(row?);
                }
            }
            tx.execute(
                "DELETE FROM queue WHERE recipient = ?1",
                params![self.surface.as_str()],
            )?;
            tx.commit()?;
            frames
        };

        debug!(surface = self.surface.as_str(), count = frames.len(), "mailbox poll");
        let count = frames.len();
        for frame in frames {
            handler(frame);
        }
        Ok(count)
    }

    fn push_queue(&self, frame: &[u8]) -> Result<(), SyncError> {
        self.conn()?.execute(
            "INSERT INTO queue (recipient, frame) VALUES (?1, ?2)",
            params![self.surface.peer().as_str(), frame],
        )?;
        Ok(())
    }

    fn peer_seen_at(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT seen_at FROM presence WHERE surface = ?1",
            params![self.surface.peer().as_str()],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| SyncError::Malformed(e.to_string())),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl PeerTransport for MailboxTransport {
    fn broadcast_latest_wins(&self, class: MessageClass, frame: &[u8]) -> Result<(), SyncError> {
        self.conn()?.execute(
            "INSERT INTO latest (sender, class, frame, revision) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(sender, class) DO UPDATE
             SET frame = excluded.frame, revision = latest.revision + 1",
            params![self.surface.as_str(), class.as_str(), frame],
        )?;
        Ok(())
    }

    fn send_best_effort(&self, frame: &[u8]) -> Result<(), SyncError> {
        if !self.is_reachable() {
            return Err(SyncError::Unreachable);
        }
        self.push_queue(frame)
    }

    fn enqueue_reliable(&self, frame: &[u8]) -> Result<(), SyncError> {
        self.push_queue(frame)
    }

    fn is_reachable(&self) -> bool {
        match self.peer_seen_at() {
            Ok(Some(seen_at)) => self.clock.now() - seen_at <= self.reachability_window,
            _ => false,
        }
    }

    fn on_receive(&self, handler: FrameHandler) {
        let mut slot = self.handler.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(handler);
    }

    /// Heartbeat, then hand every pending frame from the peer to the
    /// registered handler.
    fn poll(&self) -> Result<usize, SyncError> {
        self.drain_mailbox()
    }
}

//! SQLite-based session storage and statistics.
//!
//! Provides persistent storage for:
//! - Finished sessions, keyed by record id so duplicates are dropped
//! - Daily statistics, the last-week series and the current streak
//! - Key-value store for the persisted timer

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::StorageError;
use crate::ports::{SessionStore, StatePersistence};
use crate::sync::{CompletedSessionRecord, Surface};
use crate::timer::{PersistedTimer, SessionKind};

const TIMER_KEY: &str = "timer_state";

/// Totals for one device-local day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStats {
    pub date: NaiveDate,
    pub completed_work: u32,
    pub completed_breaks: u32,
    pub skipped: u32,
    /// Every recorded second that day, completed or skipped, in whole minutes.
    pub total_minutes: u64,
    /// One work session plus one break.
    pub pomodoros: u32,
}

impl DayStats {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            completed_work: 0,
            completed_breaks: 0,
            skipped: 0,
            total_minutes: 0,
            pomodoros: 0,
        }
    }
}

/// SQLite database for one surface.
///
/// Stores finished sessions and the persisted timer.
pub struct Database {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl Database {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(2))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        let db = Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Use `clock` to map timestamps onto local days.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Locked)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id            TEXT PRIMARY KEY,
                kind          TEXT NOT NULL,
                completed     INTEGER NOT NULL,
                duration_secs INTEGER NOT NULL,
                started_at    TEXT NOT NULL,
                ended_at      TEXT NOT NULL,
                local_day     TEXT NOT NULL,
                origin        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_local_day ON sessions(local_day);",
        )?;
        Ok(())
    }

    /// Insert a record unless one with the same id exists.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_session(&self, record: &CompletedSessionRecord) -> Result<bool, StorageError> {
        let day = self.clock.local_day(record.ended_at);
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO sessions
                (id, kind, completed, duration_secs, started_at, ended_at, local_day, origin)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.kind.as_str(),
                record.was_completed_not_skipped,
                i64::try_from(record.duration_seconds).unwrap_or(i64::MAX),
                record.started_at.to_rfc3339(),
                record.ended_at.to_rfc3339(),
                day.to_string(),
                record.origin_surface.as_str(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// All records, oldest first by end time.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    pub fn sessions(&self) -> Result<Vec<CompletedSessionRecord>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, completed, duration_secs, started_at, ended_at, origin
             FROM sessions ORDER BY ended_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, kind, completed, duration, started_at, ended_at, origin) = row?;
            let corrupt = |message: String| StorageError::Corrupt {
                key: id.clone(),
                message,
            };
            let ended_at = parse_ts(&ended_at).map_err(corrupt)?;
            out.push(CompletedSessionRecord {
                id: id.parse().map_err(|e: uuid::Error| corrupt(e.to_string()))?,
                started_at: parse_ts(&started_at).map_err(corrupt)?,
                ended_at,
                duration_seconds: u64::try_from(duration).unwrap_or(0),
                kind: kind
                    .parse::<SessionKind>()
                    .map_err(|e| corrupt(e.to_string()))?,
                was_completed_not_skipped: completed,
                origin_surface: origin
                    .parse::<Surface>()
                    .map_err(|e| corrupt(e.to_string()))?,
                timestamp: ended_at,
            });
        }
        Ok(out)
    }

    /// Totals for `day`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn stats_for_day(&self, day: NaiveDate) -> Result<DayStats, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, completed, COUNT(*), COALESCE(SUM(duration_secs), 0)
             FROM sessions
             WHERE local_day = ?1
             GROUP BY kind, completed",
        )?;
        let rows = stmt.query_map(params![day.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;

        let mut stats = DayStats::empty(day);
        let mut total_secs = 0;
        for row in rows {
            let (kind, completed, count, secs) = row?;
            total_secs += secs;
            match (kind == SessionKind::Work.as_str(), completed) {
                (_, false) => stats.skipped += count,
                (true, true) => stats.completed_work += count,
                (false, true) => stats.completed_breaks += count,
            }
        }
        stats.total_minutes = total_secs / 60;
        stats.pomodoros = stats.completed_work.min(stats.completed_breaks);
        Ok(stats)
    }

    pub fn stats_today(&self) -> Result<DayStats, StorageError> {
        self.stats_for_day(self.clock.today())
    }

    /// The seven days ending at `today`, oldest first.
    ///
    /// # Errors
    /// Returns an error if any of the queries fail.
    pub fn stats_week(&self, today: NaiveDate) -> Result<Vec<DayStats>, StorageError> {
        (0..7)
            .rev()
            .map(|back| self.stats_for_day(today - Duration::days(back)))
            .collect()
    }

    /// Consecutive days ending today with at least one completed work
    /// session. Zero when today has none yet.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn streak(&self, today: NaiveDate) -> Result<u32, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT local_day FROM sessions
             WHERE kind = ?1 AND completed = 1 AND local_day <= ?2
             ORDER BY local_day DESC",
        )?;
        let days = stmt.query_map(params![SessionKind::Work.as_str(), today.to_string()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut expected = today;
        let mut streak = 0;
        for day in days {
            let day = day?;
            if day != expected.to_string() {
                break;
            }
            streak += 1;
            expected -= Duration::days(1);
        }
        Ok(streak)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// The timer as last saved, if any.
    ///
    /// # Errors
    /// Returns [`StorageError::Corrupt`] if the stored JSON does not decode.
    pub fn load_timer(&self) -> Result<Option<PersistedTimer>, StorageError> {
        let Some(json) = self.kv_get(TIMER_KEY)? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: TIMER_KEY.into(),
                message: e.to_string(),
            })
    }
}

impl SessionStore for Database {
    fn append(&self, record: &CompletedSessionRecord) -> Result<bool, StorageError> {
        self.record_session(record)
    }
}

impl StatePersistence for Database {
    fn save_timer(&self, timer: &PersistedTimer) -> Result<(), StorageError> {
        let json = serde_json::to_string(timer)?;
        self.kv_set(TIMER_KEY, &json)
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::timer::{TimerSettings, TimerState};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn record(kind: SessionKind, completed: bool, d: u32, secs: u64) -> CompletedSessionRecord {
        let ended_at = Utc.with_ymd_and_hms(2026, 3, d, 12, 0, 0).unwrap();
        CompletedSessionRecord {
            id: Uuid::new_v4(),
            started_at: ended_at - Duration::seconds(secs as i64),
            ended_at,
            duration_seconds: secs,
            kind,
            was_completed_not_skipped: completed,
            origin_surface: Surface::Primary,
            timestamp: ended_at,
        }
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let db = Database::open_memory().unwrap();
        let r = record(SessionKind::Work, true, 2, 1500);
        assert!(db.append(&r).unwrap());
        assert!(!db.append(&r).unwrap());
        assert_eq!(db.sessions().unwrap(), vec![r]);
    }

    #[test]
    fn day_stats_split_completed_and_skipped() {
        let db = Database::open_memory().unwrap();
        db.append(&record(SessionKind::Work, true, 2, 1500)).unwrap();
        db.append(&record(SessionKind::Work, true, 2, 1500)).unwrap();
        db.append(&record(SessionKind::ShortBreak, true, 2, 300)).unwrap();
        db.append(&record(SessionKind::Work, false, 2, 120)).unwrap();
        db.append(&record(SessionKind::Work, true, 3, 1500)).unwrap();

        let stats = db.stats_for_day(day(2)).unwrap();
        assert_eq!(stats.completed_work, 2);
        assert_eq!(stats.completed_breaks, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.pomodoros, 1);
        assert_eq!(stats.total_minutes, (1500 * 2 + 300 + 120) / 60);
    }

    #[test]
    fn local_day_follows_clock_offset() {
        let clock = ManualClock::with_offset(
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            chrono::FixedOffset::east_opt(14 * 3600).unwrap(),
        );
        let db = Database::open_memory().unwrap().with_clock(Arc::new(clock));
        // 12:00 UTC is already the next day at UTC+14.
        db.append(&record(SessionKind::Work, true, 2, 1500)).unwrap();
        assert_eq!(db.stats_for_day(day(3)).unwrap().completed_work, 1);
        assert_eq!(db.stats_for_day(day(2)).unwrap().completed_work, 0);
    }

    #[test]
    fn week_is_seven_days_oldest_first() {
        let db = Database::open_memory().unwrap();
        db.append(&record(SessionKind::Work, true, 10, 1500)).unwrap();
        let week = db.stats_week(day(10)).unwrap();
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, day(4));
        assert_eq!(week[6].completed_work, 1);
    }

    #[test]
    fn streak_counts_back_from_today() {
        let db = Database::open_memory().unwrap();
        for d in [5, 7, 8, 9] {
            db.append(&record(SessionKind::Work, true, d, 1500)).unwrap();
        }
        db.append(&record(SessionKind::Work, false, 6, 100)).unwrap();
        assert_eq!(db.streak(day(9)).unwrap(), 3);
        assert_eq!(db.streak(day(10)).unwrap(), 0);
    }

    #[test]
    fn timer_roundtrips_through_kv() {
        let db = Database::open_memory().unwrap();
        assert!(db.load_timer().unwrap().is_none());
        let timer = PersistedTimer {
            state: TimerState::idle(&TimerSettings::default()),
            last_action_at: Some(Utc::now()),
            last_settings_at: None,
        };
        db.save_timer(&timer).unwrap();
        assert_eq!(db.load_timer().unwrap(), Some(timer));
    }

    #[test]
    fn corrupt_timer_is_reported() {
        let db = Database::open_memory().unwrap();
        db.kv_set(TIMER_KEY, "{not json").unwrap();
        assert!(matches!(db.load_timer(), Err(StorageError::Corrupt { .. })));
    }

    #[test]
    fn open_at_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.db");
        let r = record(SessionKind::LongBreak, true, 4, 900);
        Database::open_at(&path).unwrap().append(&r).unwrap();
        assert_eq!(Database::open_at(&path).unwrap().sessions().unwrap(), vec![r]);
    }
}

//! End-to-end timer scenarios against the public API.
//!
//! Time is simulated with `ManualClock`; nothing here sleeps.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use pomolink_core::{
    Clock, Command, Database, Event, MachineDeps, ManualClock, NoopNotifier, PersistedTimer,
    SessionKind, SessionMachine, SessionStore, StatePersistence, Surface, TimerSettings,
    TimerStatus,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn clock_at(h: u32, m: u32) -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 20, h, m, 0).unwrap())
}

fn deps(clock: &ManualClock, db: &Arc<Database>) -> MachineDeps {
    let store: Arc<dyn SessionStore> = db.clone();
    MachineDeps {
        clock: Arc::new(clock.clone()),
        notifier: Arc::new(NoopNotifier),
        store,
    }
}

fn open_db(clock: &ManualClock) -> Arc<Database> {
    Arc::new(
        Database::open_memory()
            .unwrap()
            .with_clock(Arc::new(clock.clone())),
    )
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_work_session_completes_after_simulated_suspension() {
    let clock = clock_at(9, 0);
    let db = open_db(&clock);
    let mut machine = SessionMachine::new(Surface::Primary, TimerSettings::default(), deps(&clock, &db));

    machine.start().unwrap();
    assert_eq!(machine.state_sync().remaining_seconds, 1500);

    clock.advance_secs(1500);
    let event = machine.recover().unwrap();
    assert!(matches!(event, Event::SessionCompleted { next_kind: SessionKind::ShortBreak, .. }));
    assert!(machine.recover().is_none());

    let state = machine.state();
    assert_eq!(state.completed_work_sessions, 1);
    assert_eq!(state.kind, SessionKind::ShortBreak);
    assert_eq!(state.status, TimerStatus::Idle);

    let records = db.sessions().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].was_completed_not_skipped);
    assert_eq!(records[0].duration_seconds, 1500);
    assert_eq!(records[0].kind, SessionKind::Work);
}

#[test]
fn test_restart_from_disk_recovers_expired_session() {
    let clock = clock_at(9, 0);
    let db = open_db(&clock);
    let mut machine = SessionMachine::new(Surface::Primary, TimerSettings::default(), deps(&clock, &db));
    machine.start();
    db.save_timer(&machine.persisted()).unwrap();
    drop(machine);

    // Process dead for an hour.
    clock.advance_secs(3600);
    let persisted: PersistedTimer = db.load_timer().unwrap().unwrap();
    let mut restored =
        SessionMachine::restore(Surface::Primary, TimerSettings::default(), persisted, deps(&clock, &db));
    assert!(restored.check_rollover().is_none());
    assert!(matches!(restored.recover(), Some(Event::SessionCompleted { .. })));

    let records = db.sessions().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ended_at, Utc.with_ymd_and_hms(2026, 4, 20, 9, 25, 0).unwrap());
    assert_eq!(restored.state().completed_work_sessions, 1);
}

#[test]
fn test_restore_on_a_new_day_resets_tally() {
    let clock = clock_at(22, 0);
    let db = open_db(&clock);
    let mut machine = SessionMachine::new(Surface::Primary, TimerSettings::default(), deps(&clock, &db));
    for _ in 0..2 {
        machine.start();
        clock.advance_secs(1500);
        machine.recover();
        machine.start();
        machine.skip();
    }
    assert_eq!(machine.state().completed_work_sessions, 2);
    let persisted = machine.persisted();

    clock.set(Utc.with_ymd_and_hms(2026, 4, 21, 8, 0, 0).unwrap());
    let mut restored =
        SessionMachine::restore(Surface::Primary, TimerSettings::default(), persisted, deps(&clock, &db));
    assert!(matches!(
        restored.check_rollover(),
        Some(Event::TallyRolledOver { discarded: 2, .. })
    ));
    assert_eq!(restored.state().completed_work_sessions, 0);
    assert_eq!(restored.state().last_active_day, NaiveDate::from_ymd_opt(2026, 4, 21));
}

#[test]
fn test_full_cycle_statistics() {
    let clock = clock_at(8, 0);
    let db = open_db(&clock);
    let mut machine = SessionMachine::new(Surface::Primary, TimerSettings::default(), deps(&clock, &db));

    // Four work sessions, each followed by its break.
    let mut breaks = Vec::new();
    for _ in 0..4 {
        machine.start();
        clock.advance_secs(1500);
        machine.on_expiry();
        breaks.push(machine.state().kind);
        let length = machine.state().total_duration_secs as i64;
        machine.start();
        clock.advance(Duration::seconds(length));
        machine.on_expiry();
    }
    assert_eq!(
        breaks,
        vec![
            SessionKind::ShortBreak,
            SessionKind::ShortBreak,
            SessionKind::ShortBreak,
            SessionKind::LongBreak
        ]
    );

    let today = clock.today();
    let stats = db.stats_for_day(today).unwrap();
    assert_eq!(stats.completed_work, 4);
    assert_eq!(stats.completed_breaks, 4);
    assert_eq!(stats.pomodoros, 4);
    assert_eq!(stats.total_minutes, 4 * 25 + 3 * 5 + 15);
    assert_eq!(db.streak(today).unwrap(), 1);
}

#[test]
fn test_skip_records_elapsed_wall_clock_time() {
    let clock = clock_at(10, 0);
    let db = open_db(&clock);
    let mut machine = SessionMachine::new(Surface::Primary, TimerSettings::default(), deps(&clock, &db));

    machine.start();
    clock.advance_secs(200);
    machine.pause();
    clock.advance_secs(600);
    machine.start();
    clock.advance_secs(100);
    machine.skip();

    let records = db.sessions().unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].was_completed_not_skipped);
    // Paused time does not count.
    assert_eq!(records[0].duration_seconds, 300);
    assert_eq!(records[0].started_at, Utc.with_ymd_and_hms(2026, 4, 20, 10, 0, 0).unwrap());
    assert_eq!(machine.state().completed_work_sessions, 0);
}

#[test]
fn test_settings_command_changes_next_session_only() {
    use pomolink_core::sync::{LoopbackTransport, PeerTransport};
    use pomolink_core::{SurfaceSession, SyncProtocol};

    let clock = clock_at(11, 0);
    let db = open_db(&clock);
    let machine = SessionMachine::new(Surface::Primary, TimerSettings::default(), deps(&clock, &db));
    let (transport, _peer, _link) = LoopbackTransport::pair();
    let transport: Arc<dyn PeerTransport> = Arc::new(transport);
    let mut session = SurfaceSession::new(machine, SyncProtocol::new(Surface::Primary, transport, db.clone()));

    session.dispatch(Command::Start);
    let ends_at = session.machine().state().absolute_end_at;
    let longer = TimerSettings {
        work_minutes: 45,
        ..TimerSettings::default()
    };
    session.dispatch(Command::UpdateSettings(longer));
    assert_eq!(session.machine().state().absolute_end_at, ends_at);
    assert_eq!(session.machine().state().total_duration_secs, 1500);

    session.dispatch(Command::Reset);
    assert_eq!(session.machine().state().remaining_secs, 45 * 60);
}

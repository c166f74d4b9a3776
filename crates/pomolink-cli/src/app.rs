//! Wiring one surface for a single CLI invocation.
//!
//! Every command opens the surface's own database, restores the timer,
//! pulls whatever the peer left in the shared mailbox and, on the primary
//! surface, consumes a pending ambient action. Commands then run against
//! the live [`SurfaceSession`] and [`App::finish`] flushes it back.

use std::sync::Arc;

use pomolink_core::ambient::{AmbientBridge, FileAmbientStorage};
use pomolink_core::storage::{self, Config, Database};
use pomolink_core::sync::{Inbox, MailboxTransport, PeerTransport, SyncProtocol};
use pomolink_core::{
    Clock, Command, Event, MachineDeps, NoopNotifier, Notifier, SessionKind, SessionMachine,
    Surface, SurfaceSession, SystemClock, TimerSettings,
};
use tracing::{debug, info};

/// Settings the machine was last running with.
const SETTINGS_KEY: &str = "timer_settings";
/// `[timer]` section of config.toml as of the last local apply.
const CONFIG_TIMER_KEY: &str = "config_timer";

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Completion alerts for a terminal session: a log line when scheduled.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn schedule_completion(&self, kind: SessionKind, in_secs: u64) {
        info!(%kind, in_secs, "completion alert scheduled");
    }

    fn cancel_all(&self) {
        debug!("completion alerts cancelled");
    }
}

pub struct App {
    pub session: SurfaceSession,
    pub db: Arc<Database>,
    pub config: Config,
    inbox: Inbox,
    /// Events produced while opening (rollover, recovery, peer updates).
    pub events: Vec<Event>,
}

impl App {
    pub fn open(surface: Surface) -> CliResult<Self> {
        let config = Config::load()?;
        let dir = storage::data_dir()?;
        let db = Arc::new(Database::open_at(&storage::surface_db_path(&dir, surface))?);

        let notifier: Arc<dyn Notifier> = if config.notifications.enabled {
            Arc::new(LogNotifier)
        } else {
            Arc::new(NoopNotifier)
        };
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let deps = MachineDeps {
            clock: clock.clone(),
            notifier,
            store: db.clone(),
        };

        let settings = match db.kv_get(SETTINGS_KEY)? {
            Some(json) => serde_json::from_str::<TimerSettings>(&json)?,
            None => config.timer.clone(),
        };
        let machine = match db.load_timer()? {
            Some(persisted) => SessionMachine::restore(surface, settings, persisted, deps),
            None => SessionMachine::new(surface, settings, deps),
        };

        let window = chrono::Duration::seconds(config.sync.reachability_window_secs.min(86_400) as i64);
        let transport: Arc<dyn PeerTransport> = Arc::new(
            MailboxTransport::open(&storage::mailbox_path(&dir), surface)?
                .with_clock(clock)
                .with_reachability_window(window),
        );
        let inbox = Inbox::attach(transport.as_ref());

        let mut session = SurfaceSession::new(machine, SyncProtocol::new(surface, transport, db.clone()))
            .with_persistence(db.clone());
        if surface == Surface::Primary {
            let snapshot_interval =
                chrono::Duration::seconds(config.sync.snapshot_interval_secs.min(86_400) as i64);
            let ambient = Arc::new(FileAmbientStorage::new(storage::ambient_path(&dir)));
            session = session.with_ambient(AmbientBridge::new(ambient, snapshot_interval));
        }

        let mut app = App {
            session,
            db,
            config,
            inbox,
            events: Vec::new(),
        };
        app.events = app.session.start_up();
        app.pull();
        app.apply_config()?;
        if let Some(event) = app.session.set_foreground(true) {
            app.events.push(event);
        }
        Ok(app)
    }

    /// Apply everything the peer has published since the last run.
    pub fn pull(&mut self) {
        self.session.poll_transport();
        for frame in self.inbox.drain() {
            if let Some(event) = self.session.handle_frame(&frame) {
                self.events.push(event);
            }
        }
    }

    pub fn dispatch(&mut self, command: Command) -> Option<Event> {
        self.session.dispatch(command)
    }

    /// Publish and persist. Returns the unwired session for long-running use.
    pub fn finish(mut self) -> CliResult<SurfaceSession> {
        let published = self.session.flush();
        debug!(published, "surface flushed");
        let settings = serde_json::to_string(self.session.machine().settings())?;
        self.db.kv_set(SETTINGS_KEY, &settings)?;
        Ok(self.session)
    }

    /// A config.toml edit counts as a local settings change, once.
    fn apply_config(&mut self) -> CliResult {
        let current = serde_json::to_string(&self.config.timer)?;
        if self.db.kv_get(CONFIG_TIMER_KEY)?.as_deref() == Some(current.as_str()) {
            return Ok(());
        }
        let settings = self.config.timer.clone();
        if let Some(event) = self.session.dispatch(Command::UpdateSettings(settings)) {
            self.events.push(event);
        }
        self.db.kv_set(CONFIG_TIMER_KEY, &current)?;
        Ok(())
    }
}

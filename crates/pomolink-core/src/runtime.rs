//! Per-surface event loop.
//!
//! A single task owns the [`SurfaceSession`]; everything else talks to it
//! through a [`RuntimeHandle`]. The loop multiplexes:
//!
//! - user and lifecycle commands
//! - inbound frames from the peer transport
//! - a 1 s ticker that exists only while Running and is re-armed whenever
//!   the machine's run epoch changes
//! - the ambient token poll, while the bridge asks for it
//! - the transport poll, for poll-driven transports

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::events::Event;
use crate::surface::{Command, SurfaceSession};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum RuntimeCommand {
    Timer(Command),
    Suspend,
    Resume,
    Foreground(bool),
    Snapshot(oneshot::Sender<Event>),
    Shutdown,
}

/// Cloneable sender side of a running surface.
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::UnboundedSender<RuntimeCommand>,
}

impl RuntimeHandle {
    /// Returns false if the runtime has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(RuntimeCommand::Timer(command)).is_ok()
    }

    /// The process is being suspended; the ticker stops.
    pub fn suspend(&self) -> bool {
        self.tx.send(RuntimeCommand::Suspend).is_ok()
    }

    /// The process resumed; expiry that happened meanwhile is handled now.
    pub fn resume(&self) -> bool {
        self.tx.send(RuntimeCommand::Resume).is_ok()
    }

    pub fn set_foreground(&self, foreground: bool) -> bool {
        self.tx.send(RuntimeCommand::Foreground(foreground)).is_ok()
    }

    pub async fn snapshot(&self) -> Option<Event> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RuntimeCommand::Snapshot(reply)).ok()?;
        rx.await.ok()
    }

    pub fn shutdown(&self) -> bool {
        self.tx.send(RuntimeCommand::Shutdown).is_ok()
    }
}

/// Timing knobs for the loop.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub ambient_poll: Duration,
    pub transport_poll: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ambient_poll: Duration::from_millis(500),
            transport_poll: Duration::from_secs(1),
        }
    }
}

pub struct SurfaceRuntime {
    session: SurfaceSession,
    config: RuntimeConfig,
    commands: mpsc::UnboundedReceiver<RuntimeCommand>,
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<Event>,
}

impl SurfaceRuntime {
    /// Wire `session` to fresh channels. Registers the inbound frame handler
    /// on the session's transport.
    pub fn new(
        session: SurfaceSession,
        config: RuntimeConfig,
    ) -> (Self, RuntimeHandle, mpsc::UnboundedReceiver<Event>) {
        let (cmd_tx, commands) = mpsc::unbounded_channel();
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();

        session
            .protocol()
            .transport()
            .on_receive(Arc::new(move |frame| {
                let _ = frame_tx.send(frame);
            }));

        let runtime = Self {
            session,
            config,
            commands,
            frames,
            events,
        };
        (runtime, RuntimeHandle { tx: cmd_tx }, event_rx)
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(self) {
        let SurfaceRuntime {
            mut session,
            config,
            mut commands,
            mut frames,
            events,
        } = self;
        let emit = |event: Event| {
            let _ = events.send(event);
        };

        let mut ticker: Option<(u64, Interval)> = None;
        let mut suspended = false;
        let mut ambient = interval(config.ambient_poll);
        ambient.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut transport = interval(config.transport_poll);
        transport.set_missed_tick_behavior(MissedTickBehavior::Skip);

        session.start_up().into_iter().for_each(emit);
        session.flush();

        loop {
            rearm(&mut ticker, &session, suspended);
            let poll_ambient = !suspended && session.should_poll_ambient();

            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    match command {
                        RuntimeCommand::Timer(command) => {
                            if let Some(event) = session.dispatch(command) {
                                emit(event);
                            }
                        }
                        RuntimeCommand::Suspend => {
                            debug!("surface suspended");
                            suspended = true;
                        }
                        RuntimeCommand::Resume => {
                            debug!("surface resumed");
                            suspended = false;
                            if let Some(event) = session.dispatch(Command::Recover) {
                                emit(event);
                            }
                        }
                        RuntimeCommand::Foreground(foreground) => {
                            if let Some(event) = session.set_foreground(foreground) {
                                emit(event);
                            }
                        }
                        RuntimeCommand::Snapshot(reply) => {
                            let _ = reply.send(session.snapshot());
                        }
                        RuntimeCommand::Shutdown => break,
                    }
                }
                Some(frame) = frames.recv() => {
                    if let Some(event) = session.handle_frame(&frame) {
                        emit(event);
                    }
                }
                epoch = next_tick(&mut ticker) => {
                    if let Some(event) = session.tick(epoch) {
                        emit(event);
                    }
                }
                _ = ambient.tick(), if poll_ambient => {
                    if let Some(event) = session.poll_ambient() {
                        emit(event);
                    }
                }
                _ = transport.tick(), if !suspended => {
                    session.poll_transport();
                }
            }

            session.flush();
        }

        session.flush();
        debug!("surface runtime stopped");
    }
}

/// Keep the ticker in step with the machine: none unless Running, and a
/// fresh one for every new run epoch.
fn rearm(ticker: &mut Option<(u64, Interval)>, session: &SurfaceSession, suspended: bool) {
    let machine = session.machine();
    if suspended || !machine.is_running() {
        *ticker = None;
        return;
    }
    let epoch = machine.run_epoch();
    if ticker.as_ref().map(|(armed, _)| *armed) != Some(epoch) {
        let mut fresh = interval_at(Instant::now() + TICK, TICK);
        fresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        *ticker = Some((epoch, fresh));
    }
}

async fn next_tick(ticker: &mut Option<(u64, Interval)>) -> u64 {
    match ticker {
        Some((epoch, interval)) => {
            interval.tick().await;
            *epoch
        }
        None => std::future::pending().await,
    }
}

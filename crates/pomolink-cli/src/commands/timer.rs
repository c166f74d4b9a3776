use clap::Subcommand;
use pomolink_core::{Command, RuntimeConfig, SessionKind, Surface, SurfaceRuntime};

use super::print_json;
use crate::app::{App, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start or resume the current session
    Start,
    /// Pause a running session
    Pause,
    /// Discard the current session and return to idle
    Reset,
    /// End the current session without counting it
    Skip,
    /// Switch the idle timer to another session kind
    Kind {
        /// work, short_break or long_break
        kind: SessionKind,
    },
    /// Print current timer state as JSON
    Status,
    /// Keep running, printing events as JSON lines until Ctrl-C
    Watch,
}

pub fn run(surface: Surface, action: TimerAction) -> CliResult {
    let mut app = App::open(surface)?;

    let command = match action {
        TimerAction::Start => Command::Start,
        TimerAction::Pause => Command::Pause,
        TimerAction::Reset => Command::Reset,
        TimerAction::Skip => Command::Skip,
        TimerAction::Kind { kind } => Command::ChangeKind(kind),
        TimerAction::Status => {
            print_json(&app.session.snapshot())?;
            app.finish()?;
            return Ok(());
        }
        TimerAction::Watch => return watch(app),
    };

    // Invalid transitions are no-ops; show where the timer stands instead.
    match app.dispatch(command) {
        Some(event) => print_json(&event)?,
        None => print_json(&app.session.snapshot())?,
    }
    app.finish()?;
    Ok(())
}

fn watch(app: App) -> CliResult {
    let config = RuntimeConfig {
        ambient_poll: std::time::Duration::from_millis(app.config.sync.ambient_poll_ms),
        ..RuntimeConfig::default()
    };
    for event in &app.events {
        println!("{}", serde_json::to_string(event)?);
    }
    let session = app.finish()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (runtime, handle, mut events) = SurfaceRuntime::new(session, config);
        let worker = tokio::spawn(runtime.run());
        println!("{}", serde_json::to_string(&handle.snapshot().await)?);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => println!("{}", serde_json::to_string(&event)?),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    handle.shutdown();
                    break;
                }
            }
        }
        worker.await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

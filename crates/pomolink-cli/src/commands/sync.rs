use clap::Subcommand;
use pomolink_core::Surface;

use super::print_json;
use crate::app::{App, CliResult};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Apply pending peer messages and print what changed
    Pull,
    /// Print every recorded session, newest last
    Sessions,
}

pub fn run(surface: Surface, action: SyncAction) -> CliResult {
    let app = App::open(surface)?;
    match action {
        SyncAction::Pull => print_json(&app.events)?,
        SyncAction::Sessions => print_json(&app.db.sessions()?)?,
    }
    app.finish()?;
    Ok(())
}

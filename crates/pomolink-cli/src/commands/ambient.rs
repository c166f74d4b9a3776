use chrono::Utc;
use clap::Subcommand;
use pomolink_core::ambient::{AmbientAction, AmbientStorage, FileAmbientStorage};
use pomolink_core::storage;

use super::print_json;
use crate::app::CliResult;

/// Acts as the ambient display: it only touches the shared document.
#[derive(Subcommand)]
pub enum AmbientCommand {
    /// Leave an action for the primary surface to pick up
    Request {
        /// play, pause, reset or skip
        action: AmbientAction,
    },
    /// Print the last snapshot and any pending action
    Show,
}

pub fn run(action: AmbientCommand) -> CliResult {
    let shared = FileAmbientStorage::new(storage::ambient_path(&storage::data_dir()?));
    match action {
        AmbientCommand::Request { action } => {
            shared.request_action(action, Utc::now())?;
            println!("ok");
        }
        AmbientCommand::Show => {
            let snapshot = shared.read_snapshot()?;
            let remaining = snapshot.as_ref().map(|s| s.remaining_at(Utc::now()));
            print_json(&serde_json::json!({
                "snapshot": snapshot,
                "remaining_seconds_now": remaining,
                "pending_action": shared.read_pending_action()?,
            }))?;
        }
    }
    Ok(())
}

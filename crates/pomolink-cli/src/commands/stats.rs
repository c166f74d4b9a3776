use clap::Subcommand;
use pomolink_core::{Clock, Surface, SystemClock};

use super::print_json;
use crate::app::{App, CliResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's stats and the current streak
    Today,
    /// The last seven days, oldest first
    Week,
}

pub fn run(surface: Surface, action: StatsAction) -> CliResult {
    // Opening pulls peer records first so both surfaces report the same.
    let app = App::open(surface)?;
    let today = SystemClock.today();

    match action {
        StatsAction::Today => {
            let stats = app.db.stats_for_day(today)?;
            let streak = app.db.streak(today)?;
            print_json(&serde_json::json!({ "today": stats, "streak": streak }))?;
        }
        StatsAction::Week => {
            print_json(&app.db.stats_week(today)?)?;
        }
    }
    app.finish()?;
    Ok(())
}

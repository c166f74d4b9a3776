use std::collections::BTreeMap;

use clap::Subcommand;
use pomolink_core::{Config, Surface};

use super::print_json;
use crate::app::{App, CliResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value from config.toml
    Get {
        /// Dot-path key (e.g. "timer.work_minutes", "sync.ambient_poll_ms")
        key: String,
    },
    /// Change one value in config.toml; the next invocation broadcasts it
    Set {
        key: String,
        value: String,
    },
    /// Every key in config.toml with its value
    List,
    /// Timer settings this surface is actually running with, including
    /// changes received from the peer
    Effective,
    /// Overwrite config.toml with the defaults
    Reset,
}

pub fn run(surface: Surface, action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let value = Config::load()?
                .get(&key)
                .ok_or_else(|| format!("unknown key: {key}"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("ok");
        }
        ConfigAction::List => {
            let entries: BTreeMap<String, String> = Config::load()?.entries().into_iter().collect();
            print_json(&entries)?;
        }
        ConfigAction::Effective => {
            let app = App::open(surface)?;
            print_json(app.session.machine().settings())?;
            app.finish()?;
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}

mod kind;
mod machine;
mod monitor;
mod rollover;
mod settings;
mod state;

pub use kind::SessionKind;
pub use machine::{MachineDeps, SessionMachine};
pub use monitor::{SettingsDelta, SettingsMonitor, SettingsOrigin};
pub use rollover::{apply_rollover, rollover_needed};
pub use settings::{DurationPolicy, TimerSettings};
pub use state::{PersistedTimer, TimerState, TimerStatus};
pub(crate) use state::ceil_secs;

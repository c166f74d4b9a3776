pub mod ambient;
pub mod config;
pub mod stats;
pub mod sync;
pub mod timer;

use serde::Serialize;

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

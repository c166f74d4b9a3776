//! Daily rollover of the completed-work tally.
//!
//! Days are device-local calendar days. The check runs when a session
//! completes, not when it started, so a session straddling midnight counts
//! toward the day it finished on.

use chrono::NaiveDate;

/// Whether the tally belongs to a day other than `today`.
pub fn rollover_needed(last_active_day: Option<NaiveDate>, today: NaiveDate) -> bool {
    last_active_day != Some(today)
}

/// Resets `tally` if it belongs to another day and stamps `today`.
///
/// Returns the tally value that was discarded, if a reset happened.
pub fn apply_rollover(
    tally: &mut u32,
    last_active_day: &mut Option<NaiveDate>,
    today: NaiveDate,
) -> Option<u32> {
    if !rollover_needed(*last_active_day, today) {
        return None;
    }
    let previous = std::mem::replace(tally, 0);
    *last_active_day = Some(today);
    Some(previous)
}

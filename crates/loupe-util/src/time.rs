//! Time utilities for loupe
//!
//! Idle expiry is enforced on the monotonic clock inside the controller;
//! the wall-clock helpers here exist only for reporting deadlines in logs
//! and status snapshots.

use chrono::{DateTime, Local};
use std::time::Duration;

/// Get the current local time.
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Wall-clock time `after` from now, for display of an idle deadline.
///
/// Saturates at the current time when the duration does not fit chrono's range.
pub fn deadline_after(after: Duration) -> DateTime<Local> {
    wall_deadline(now(), after)
}

/// Wall-clock time `after` from `from`.
pub fn wall_deadline(from: DateTime<Local>, after: Duration) -> DateTime<Local> {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(from)
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

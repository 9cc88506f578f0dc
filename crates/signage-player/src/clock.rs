use chrono::{DateTime, Local, Utc};

/// Wall-clock display string, updated once per second by the core loop.
pub fn wall_clock_text(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%H:%M:%S").to_string()
}

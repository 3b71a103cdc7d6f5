//! Run time conversion and formatting

use std::time::Duration;

/// Length of `ticks` simulation ticks, saturating at `Duration::MAX`
pub fn ticks_to_duration(tick_interval: Duration, ticks: u64) -> Duration {
    let ticks = u32::try_from(ticks).unwrap_or(u32::MAX);
    tick_interval.saturating_mul(ticks)
}

/// Format a run time the way speedrun timers show it:
/// `S.mmm`, `M:SS.mmm` or `H:MM:SS.mmm`.
pub fn format_time(time: Duration) -> String {
    let total_ms = time.as_millis();
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
    } else if mins > 0 {
        format!("{}:{:02}.{:03}", mins, secs, ms)
    } else {
        format!("{}.{:03}", secs, ms)
    }
}

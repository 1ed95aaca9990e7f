use chrono::Duration;

use crate::timer::model::END_OF_CONTENT_SENTINEL_MS;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Remaining {
    Finite(Duration),
    /// The timer waits for the end of the current item; there is no deadline.
    NotApplicable,
}

/// Time left until `fire_at_epoch_ms`, never negative.
pub fn remaining(fire_at_epoch_ms: i64, now_epoch_ms: i64) -> Remaining {
    if fire_at_epoch_ms == END_OF_CONTENT_SENTINEL_MS {
        return Remaining::NotApplicable;
    }
    let left_ms = fire_at_epoch_ms.saturating_sub(now_epoch_ms).max(0);
    Remaining::Finite(Duration::try_milliseconds(left_ms).unwrap_or(Duration::MAX))
}

/// Formats as `M:SSm`, rounding partial seconds up so a countdown only shows
/// `0:00m` once it has actually elapsed.
pub fn format(duration: Duration) -> String {
    let total_ms = duration.num_milliseconds().max(0);
    let total_seconds = total_ms / 1_000 + i64::from(total_ms % 1_000 != 0);
    format!("{}:{:02}m", total_seconds / 60, total_seconds % 60)
}

pub fn format_remaining(remaining: Remaining) -> String {
    match remaining {
        Remaining::Finite(duration) => format(duration),
        Remaining::NotApplicable => "-".to_string(),
    }
}

use chrono::{DateTime, Duration, Utc};

use crate::models::{Slot, Token};

/// `slot_start + (position - 1) * avg_consult_minutes + delay_minutes`
pub fn estimate(
    position: u32,
    slot_start: DateTime<Utc>,
    delay_minutes: u32,
    avg_consult_minutes: u32,
) -> DateTime<Utc> {
    let ahead = i64::from(position.saturating_sub(1));
    slot_start
        + Duration::minutes(ahead * i64::from(avg_consult_minutes))
        + Duration::minutes(i64::from(delay_minutes))
}

/// Recomputes the estimated time of every token in an already positioned queue.
pub fn apply_estimates(queue: &mut [Token], slot: &Slot, avg_consult_minutes: u32) {
    for token in queue.iter_mut() {
        token.estimated_time = estimate(
            token.queue_position,
            slot.start_time,
            slot.delay_minutes,
            avg_consult_minutes,
        );
    }
}

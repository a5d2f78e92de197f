use tracing::debug;

use crate::models::Token;
use crate::services::priority::PriorityPolicy;

pub fn token_number(position: u32) -> String {
    format!("T{:03}", position)
}

/// Sorts a slot's active tokens into queue order and assigns positions 1..N
/// along with the matching display numbers.
///
/// O(n log n) per call. Callers pass exactly one slot's active set; terminal
/// tokens must already be filtered out.
pub fn reorder(mut active: Vec<Token>) -> Vec<Token> {
    debug_assert!(active.iter().all(Token::is_active));

    active.sort_by(PriorityPolicy::compare);

    for (index, token) in active.iter_mut().enumerate() {
        let position = index as u32 + 1;
        token.queue_position = position;
        token.token_number = token_number(position);
    }

    debug_assert!(is_contiguous(&active));
    debug!("Reordered {} active tokens", active.len());
    active
}

/// True when positions run 1..N in queue order with no gaps or duplicates.
pub fn is_contiguous(queue: &[Token]) -> bool {
    queue
        .iter()
        .enumerate()
        .all(|(index, token)| token.queue_position == index as u32 + 1)
}

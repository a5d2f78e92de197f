use std::cmp::{Ordering, Reverse};

use shared_config::PriorityWeights;

use crate::models::{Token, TokenChannel};

/// Maps intake channels onto priority scores.
///
/// Arrival order is never folded into the score. Peers within a channel are
/// separated by the token's creation ordinal, a secondary sort key, so no
/// amount of traffic can push a token into the next weight band.
#[derive(Debug, Clone, Copy)]
pub struct PriorityPolicy {
    weights: PriorityWeights,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self::new(PriorityWeights::default())
    }
}

impl PriorityPolicy {
    pub fn new(weights: PriorityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &PriorityWeights {
        &self.weights
    }

    pub fn score(&self, channel: TokenChannel) -> i32 {
        match channel {
            TokenChannel::Emergency => self.weights.emergency,
            TokenChannel::Priority => self.weights.priority,
            TokenChannel::Followup => self.weights.followup,
            TokenChannel::Online => self.weights.online,
            TokenChannel::Walkin => self.weights.walkin,
        }
    }

    /// Scores a raw channel label; anything unrecognised gets the walk-in weight.
    pub fn score_label(&self, label: &str) -> i32 {
        TokenChannel::from_label(label)
            .map(|channel| self.score(channel))
            .unwrap_or(self.weights.walkin)
    }

    /// Queue order key: higher score first, then earlier creation ordinal.
    pub fn sort_key(token: &Token) -> (Reverse<i32>, u64) {
        (Reverse(token.priority), token.sequence)
    }

    pub fn compare(a: &Token, b: &Token) -> Ordering {
        Self::sort_key(a).cmp(&Self::sort_key(b))
    }
}

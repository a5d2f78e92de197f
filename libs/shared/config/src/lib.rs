use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub emergency: i32,
    pub priority: i32,
    pub followup: i32,
    pub online: i32,
    pub walkin: i32,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            emergency: 1000,
            priority: 500,
            followup: 300,
            online: 200,
            walkin: 100,
        }
    }
}

impl PriorityWeights {
    /// Weights must be strictly ordered EMERGENCY > PRIORITY > FOLLOWUP > ONLINE > WALKIN.
    pub fn validate(&self) -> Result<(), String> {
        let ordered = [self.emergency, self.priority, self.followup, self.online, self.walkin];
        if ordered.windows(2).all(|pair| pair[0] > pair[1]) {
            Ok(())
        } else {
            Err(format!(
                "priority weights must be strictly descending from EMERGENCY to WALKIN, got {:?}",
                ordered
            ))
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub priority_weights: PriorityWeights,
    pub average_consultation_minutes: u32,
    pub slot_lock_timeout_ms: u64,
    pub default_slot_capacity: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 8000,
            priority_weights: PriorityWeights::default(),
            average_consultation_minutes: 10,
            slot_lock_timeout_ms: 2000,
            default_slot_capacity: 6,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let weights = defaults.priority_weights;

        let config = Self {
            server_port: env_or("PORT", defaults.server_port),
            priority_weights: PriorityWeights {
                emergency: env_or("EMERGENCY_PRIORITY", weights.emergency),
                priority: env_or("PAID_PRIORITY", weights.priority),
                followup: env_or("FOLLOWUP_PRIORITY", weights.followup),
                online: env_or("ONLINE_PRIORITY", weights.online),
                walkin: env_or("WALKIN_PRIORITY", weights.walkin),
            },
            average_consultation_minutes: env_or(
                "AVG_CONSULTATION_MINUTES",
                defaults.average_consultation_minutes,
            ),
            slot_lock_timeout_ms: env_or("SLOT_LOCK_TIMEOUT_MS", defaults.slot_lock_timeout_ms),
            default_slot_capacity: env_or("DEFAULT_MAX_CAPACITY", defaults.default_slot_capacity),
        };

        if let Err(reason) = config.priority_weights.validate() {
            warn!("{}, falling back to default weights", reason);
            return Self {
                priority_weights: PriorityWeights::default(),
                ..config
            };
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        self.priority_weights.validate().is_ok()
            && self.average_consultation_minutes > 0
            && self.slot_lock_timeout_ms > 0
    }
}

fn env_or<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", key, default);
            default
        }
    }
}

pub mod allocation;
pub mod estimate;
pub mod lock;
pub mod priority;
pub mod reorder;
pub mod store;
pub mod validation;

pub use allocation::TokenAllocationService;
pub use estimate::{apply_estimates, estimate};
pub use lock::{SlotGuard, SlotLockManager};
pub use priority::PriorityPolicy;
pub use reorder::{is_contiguous, reorder, token_number};
pub use store::{InMemoryQueueStore, SlotLedger, TokenStore};

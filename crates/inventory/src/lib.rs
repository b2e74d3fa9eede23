//! Inventory domain module.
//!
//! Per-(product, store) availability records and the rules that move them:
//! booking allocation and restock validation. Pure, deterministic logic
//! (no IO, no HTTP, no storage).

pub mod allocation;
pub mod availability;
pub mod restock;
pub mod store;

pub use allocation::{Allocation, Decrement, allocate, check_requested};
pub use availability::{AvailabilityRecord, StockLevel, allocation_order, total_quantity};
pub use restock::{CHECKPOINT_INTERVAL, RestockPlan, is_checkpoint, plan_restock};
pub use store::Store;

pub mod config;
pub mod inventory;
pub mod target_key;
pub mod types;

pub use config::SweepConfig;
pub use inventory::{Inventory, InventoryError, InventoryRecord};
pub use target_key::{CorrelationKey, KeyError};
pub use types::*;

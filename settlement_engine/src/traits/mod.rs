//! The behaviour of the settlement engine is defined by the traits in this module. Backends
//! implement [`SettlementDatabase`] and [`AccountManagement`]; the APIs in [`crate::api`] are
//! generic over them.

mod account_management;
mod error;
mod settlement_database;

pub use account_management::AccountManagement;
pub use error::{is_lock_contention, is_unique_violation, SettlementError};
pub use settlement_database::SettlementDatabase;

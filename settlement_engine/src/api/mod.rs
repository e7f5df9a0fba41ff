mod accounts_api;
mod settlement_api;

pub use accounts_api::AccountApi;
pub use settlement_api::{CreditSettlement, SettlementApi};

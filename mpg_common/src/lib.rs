mod money;

pub mod crypto;
pub mod helpers;
pub mod op;
mod secret;

pub use money::{Money, MoneyConversionError, SETTLEMENT_CURRENCY_CODE};
pub use secret::Secret;

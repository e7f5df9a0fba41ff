//! # Settlement engine
//!
//! The reconciliation core of the merchant payments gateway. Inbound provider credits and
//! merchant withdrawals are turned into immutable [`db_types::PaymentEvent`] records and
//! optimistic-concurrency balance mutations, with exactly-once settlement guaranteed by
//! natural-key uniqueness at the storage layer.
//!
//! The engine is storage-agnostic: behaviour is defined by the [`traits::SettlementDatabase`]
//! and [`traits::AccountManagement`] traits, with a SQLite implementation in [`sqlite`]. The
//! public entry points are [`SettlementApi`] (credits, withdrawals, refunds) and [`AccountApi`]
//! (lookups, histories, admin); committed outcomes are handed to the outbound notifier via the
//! [`events`] channel.

pub mod api;
pub mod db_types;
pub mod events;
pub mod fees;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use api::{AccountApi, SettlementApi};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

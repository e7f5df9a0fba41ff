//! Stateless pub-sub hand-off between settlement and notification.
//!
//! The settlement APIs publish a [`SettlementEvent`] after each committed ledger change. Whoever
//! registers a hook (the server's outbound notifier, tests, nobody at all) consumes them from an
//! mpsc channel after the fact; a slow or absent consumer never holds up settlement.

mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::{SettlementEvent, SettlementEventType};
pub use hooks::{EventHandlers, EventHooks, EventProducers};

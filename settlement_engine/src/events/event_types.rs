use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::db_types::PaymentEvent;

/// The merchant-facing name of a settlement outcome. These strings appear verbatim in the
/// `event` field of outbound notification envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementEventType {
    CollectionCompleted,
    CollectionRefunded,
    WithdrawalCompleted,
    WithdrawalFailed,
    WithdrawalCancelled,
}

impl SettlementEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectionCompleted => "collection.completed",
            Self::CollectionRefunded => "collection.refunded",
            Self::WithdrawalCompleted => "withdrawal.completed",
            Self::WithdrawalFailed => "withdrawal.failed",
            Self::WithdrawalCancelled => "withdrawal.cancelled",
        }
    }
}

impl Display for SettlementEventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementEvent {
    pub event_type: SettlementEventType,
    pub event: PaymentEvent,
}

impl SettlementEvent {
    pub fn new(event_type: SettlementEventType, event: PaymentEvent) -> Self {
        Self { event_type, event }
    }
}

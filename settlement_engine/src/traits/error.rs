use mpg_common::Money;
use thiserror::Error;

use crate::db_types::EventStatus;

/// Everything that can go wrong while reconciling a payment event.
#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("Merchant account {0} does not exist")]
    AccountNotFound(i64),
    #[error("Merchant account {0} is not active")]
    AccountNotActive(i64),
    #[error("No merchant is bound to virtual account {0}")]
    BindingNotFound(String),
    #[error("A record for this event already exists")]
    DuplicateEvent,
    #[error("No settlement record with order id {0}")]
    EventNotFound(String),
    #[error("A withdrawal with this order id is already in flight")]
    WithdrawalInProgress,
    #[error("A failed withdrawal with this order id may be retried in {0} seconds")]
    RetryCooldown(i64),
    #[error("The account was modified concurrently; the mutation was not applied")]
    VersionConflict,
    #[error("Insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance { available: Money, requested: Money },
    #[error("Event in state {from} cannot move to {to}")]
    InvalidStatusChange { from: EventStatus, to: EventStatus },
    #[error("The balance was mutated but the matching record could not be written: {0}")]
    OrphanedMutation(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        if is_lock_contention(&e) {
            return Self::VersionConflict;
        }
        Self::DatabaseError(e.to_string())
    }
}

/// SQLite reports a lost write race as SQLITE_BUSY (5) or SQLITE_LOCKED (6). Contention is not
/// a storage failure: it becomes [`SettlementError::VersionConflict`], so the API retry loops
/// re-read the account and re-apply, and a race that drained the funds surfaces as
/// [`SettlementError::InsufficientBalance`] rather than a 500.
pub fn is_lock_contention(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(de) if matches!(de.code().as_deref(), Some("5") | Some("6")))
}

/// SQLite reports violations of the natural-key indexes as unique constraint errors. Those are
/// the final arbiter for duplicate settlement, so the db layer maps them to domain errors rather
/// than letting them surface as [`SettlementError::DatabaseError`].
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(de) if de.is_unique_violation())
}

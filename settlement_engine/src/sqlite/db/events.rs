//! Insertion and status transitions for settlement records.
//!
//! Records are immutable apart from `status`, its timestamp columns and the error fields written
//! alongside a failure. Every insert validates the conservation invariant before touching the
//! database, and the partial unique indexes on `payment_events` are the final arbiter for
//! duplicates.

use chrono::Utc;
use log::*;
use mpg_common::Money;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{Direction, EventMetadata, EventStatus, OrderId, PaymentEvent},
    traits::{is_unique_violation, SettlementError},
};

pub struct NewEventRecord<'a> {
    pub order_id: &'a OrderId,
    pub client_order_id: Option<&'a OrderId>,
    pub account_id: i64,
    pub direction: Direction,
    pub status: EventStatus,
    pub gross_amount: Money,
    pub charge_amount: Money,
    pub net_amount: Money,
    pub amount_after_fee: Option<Money>,
    pub previous_balance: Money,
    pub new_balance: Money,
    pub currency: &'a str,
    pub metadata: &'a EventMetadata,
}

impl NewEventRecord<'_> {
    fn conserves_balance(&self) -> bool {
        match self.direction {
            Direction::Credit => self.previous_balance + self.net_amount == self.new_balance,
            Direction::Debit => self.previous_balance - self.gross_amount == self.new_balance,
        }
    }
}

pub async fn event_by_id(id: i64, conn: &mut SqliteConnection) -> Result<PaymentEvent, SettlementError> {
    let event =
        sqlx::query_as::<_, PaymentEvent>("SELECT * FROM payment_events WHERE id = ?").bind(id).fetch_one(conn).await?;
    Ok(event)
}

pub async fn event_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentEvent>, SettlementError> {
    let event = sqlx::query_as::<_, PaymentEvent>(
        "SELECT * FROM payment_events WHERE order_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(event)
}

pub async fn credit_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentEvent>, SettlementError> {
    let event =
        sqlx::query_as::<_, PaymentEvent>("SELECT * FROM payment_events WHERE order_id = ? AND direction = 'Credit'")
            .bind(order_id)
            .fetch_optional(conn)
            .await?;
    Ok(event)
}

/// The most recent withdrawal for `(account, client order id)`. Failed retries can leave several
/// rows behind; the latest one carries the state that matters for idempotency decisions.
pub async fn withdrawal_by_client_order(
    account_id: i64,
    client_order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentEvent>, SettlementError> {
    let event = sqlx::query_as::<_, PaymentEvent>(
        r#"SELECT * FROM payment_events
           WHERE account_id = ? AND client_order_id = ? AND direction = 'Debit'
           ORDER BY id DESC LIMIT 1"#,
    )
    .bind(account_id)
    .bind(client_order_id)
    .fetch_optional(conn)
    .await?;
    Ok(event)
}

pub async fn insert_event(record: NewEventRecord<'_>, conn: &mut SqliteConnection) -> Result<PaymentEvent, SettlementError> {
    if !record.conserves_balance() {
        return Err(SettlementError::ValidationError(format!(
            "Record for {} does not conserve the balance ({} -> {})",
            record.order_id, record.previous_balance, record.new_balance
        )));
    }
    debug_assert!(record.gross_amount.is_positive());
    let completed_at = (record.status == EventStatus::Completed).then(Utc::now);
    let res = sqlx::query(
        r#"INSERT INTO payment_events (
               order_id, client_order_id, account_id, direction, status,
               gross_amount, charge_amount, net_amount, amount_after_fee,
               previous_balance, new_balance, currency, metadata, completed_at
           ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(record.order_id)
    .bind(record.client_order_id)
    .bind(record.account_id)
    .bind(record.direction)
    .bind(record.status)
    .bind(record.gross_amount)
    .bind(record.charge_amount)
    .bind(record.net_amount)
    .bind(record.amount_after_fee)
    .bind(record.previous_balance)
    .bind(record.new_balance)
    .bind(record.currency)
    .bind(Json(record.metadata))
    .bind(completed_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| if is_unique_violation(&e) { SettlementError::DuplicateEvent } else { e.into() })?;
    let event = event_by_id(res.last_insert_rowid(), conn).await?;
    trace!("🗃️ Wrote settlement record: {event}");
    Ok(event)
}

/// Moves a record to `new_status`, enforcing the lifecycle table and stamping the matching
/// timestamp column. `error` carries the provider's `(code, message)` on failure paths.
pub async fn update_event_status(
    event_id: i64,
    new_status: EventStatus,
    error: Option<(&str, &str)>,
    conn: &mut SqliteConnection,
) -> Result<PaymentEvent, SettlementError> {
    let event = event_by_id(event_id, &mut *conn).await?;
    if !event.status.can_transition_to(new_status) {
        return Err(SettlementError::InvalidStatusChange { from: event.status, to: new_status });
    }
    let now = Utc::now();
    let completed_at = if new_status == EventStatus::Completed { Some(now) } else { event.completed_at };
    let failed_at = (new_status == EventStatus::Failed).then_some(now);
    let cancelled_at = (new_status == EventStatus::Cancelled).then_some(now);
    let (error_code, error_message) = error.unzip();
    sqlx::query(
        r#"UPDATE payment_events SET
               status = ?, error_code = ?, error_message = ?,
               completed_at = ?, failed_at = ?, cancelled_at = ?, updated_at = CURRENT_TIMESTAMP
           WHERE id = ?"#,
    )
    .bind(new_status)
    .bind(error_code)
    .bind(error_message)
    .bind(completed_at)
    .bind(failed_at)
    .bind(cancelled_at)
    .bind(event_id)
    .execute(&mut *conn)
    .await?;
    debug!("🗃️ Record for {} moved {} -> {new_status}", event.order_id, event.status);
    event_by_id(event_id, conn).await
}

pub async fn events_for_account(
    account_id: i64,
    limit: i64,
    offset: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentEvent>, SettlementError> {
    let events = sqlx::query_as::<_, PaymentEvent>(
        "SELECT * FROM payment_events WHERE account_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
    )
    .bind(account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await?;
    Ok(events)
}

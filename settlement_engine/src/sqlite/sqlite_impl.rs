//! SQLite implementation of the settlement contracts.
//!
//! Transaction boundaries live here: every operation that mutates a balance writes its matching
//! settlement record inside the same transaction, so a crash can never leave a mutation without
//! a record or a record without a mutation. A failure on the commit itself is the one place
//! where the outcome is indeterminate, and it surfaces as [`SettlementError::OrphanedMutation`]
//! for operational follow-up.

use log::*;
use mpg_common::Money;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::{
    db_types::{
        Direction,
        EventMetadata,
        EventStatus,
        MerchantAccount,
        NewCredit,
        NewDeliveryAttempt,
        NewMerchantAccount,
        NewVirtualAccountBinding,
        NewWithdrawal,
        OrderId,
        PaymentEvent,
        VirtualAccountBinding,
        WebhookDeliveryAttempt,
        WithdrawalResolution,
    },
    fees::Charge,
    sqlite::{db, MIGRATOR},
    traits::{is_lock_contention, AccountManagement, SettlementDatabase, SettlementError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase").field("url", &self.url).finish()
    }
}

impl SqliteDatabase {
    /// Creates a connection pool against `url` and runs any outstanding migrations.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, SettlementError> {
        let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
        MIGRATOR.run(&pool).await.map_err(|e| SettlementError::DatabaseError(e.to_string()))?;
        debug!("🗃️ Connected to database {url} with {max_connections} connections");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn commit_err(e: sqlx::Error) -> SettlementError {
        if is_lock_contention(&e) {
            // SQLITE_BUSY at commit means the transaction did not apply; the caller may retry.
            return SettlementError::VersionConflict;
        }
        // The transaction may or may not have been applied.
        SettlementError::OrphanedMutation(e.to_string())
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_credit_event(&self, order_id: &OrderId) -> Result<Option<PaymentEvent>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::events::credit_by_order_id(order_id, &mut conn).await
    }

    async fn fetch_withdrawal_event(
        &self,
        account_id: i64,
        client_order_id: &OrderId,
    ) -> Result<Option<PaymentEvent>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::events::withdrawal_by_client_order(account_id, client_order_id, &mut conn).await
    }

    async fn fetch_binding(&self, account_number: &str) -> Result<Option<VirtualAccountBinding>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::bindings::binding_by_account_number(account_number, &mut conn).await
    }

    async fn settle_credit(
        &self,
        credit: &NewCredit,
        account_id: i64,
        charge: Charge,
    ) -> Result<PaymentEvent, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let account =
            db::accounts::account_by_id(account_id, &mut *tx).await?.ok_or(SettlementError::AccountNotFound(account_id))?;
        let new_balance = account.balance + charge.net;
        db::accounts::apply_balance_delta(account_id, account.version, new_balance, &mut *tx).await?;
        let record = db::events::insert_event(
            db::events::NewEventRecord {
                order_id: &credit.order_id,
                client_order_id: None,
                account_id,
                direction: Direction::Credit,
                status: EventStatus::Completed,
                gross_amount: charge.gross,
                charge_amount: charge.charge,
                net_amount: charge.net,
                amount_after_fee: None,
                previous_balance: account.balance,
                new_balance,
                currency: &credit.currency,
                metadata: &credit.metadata,
            },
            &mut *tx,
        )
        .await?;
        tx.commit().await.map_err(Self::commit_err)?;
        info!("🗃️ Settled credit {} for account #{account_id}: {} net", credit.order_id, charge.net);
        Ok(record)
    }

    async fn debit_for_withdrawal(
        &self,
        withdrawal: &NewWithdrawal,
        order_id: &OrderId,
        fee: Money,
    ) -> Result<PaymentEvent, SettlementError> {
        let account_id = withdrawal.account_id;
        let mut tx = self.pool.begin().await?;
        let account =
            db::accounts::account_by_id(account_id, &mut *tx).await?.ok_or(SettlementError::AccountNotFound(account_id))?;
        if account.balance < withdrawal.gross_amount {
            return Err(SettlementError::InsufficientBalance {
                available: account.balance,
                requested: withdrawal.gross_amount,
            });
        }
        let new_balance = account.balance - withdrawal.gross_amount;
        db::accounts::apply_balance_delta(account_id, account.version, new_balance, &mut *tx).await?;
        let record = db::events::insert_event(
            db::events::NewEventRecord {
                order_id,
                client_order_id: Some(&withdrawal.client_order_id),
                account_id,
                direction: Direction::Debit,
                status: EventStatus::Pending,
                gross_amount: withdrawal.gross_amount,
                charge_amount: fee,
                net_amount: withdrawal.gross_amount - fee,
                amount_after_fee: Some(withdrawal.gross_amount - fee),
                previous_balance: account.balance,
                new_balance,
                currency: mpg_common::SETTLEMENT_CURRENCY_CODE,
                metadata: &withdrawal.metadata,
            },
            &mut *tx,
        )
        .await?;
        tx.commit().await.map_err(Self::commit_err)?;
        info!(
            "🗃️ Debited {} from account #{account_id} for withdrawal {} ({})",
            withdrawal.gross_amount, withdrawal.client_order_id, order_id
        );
        Ok(record)
    }

    async fn finalize_withdrawal(
        &self,
        order_id: &OrderId,
        resolution: &WithdrawalResolution,
    ) -> Result<PaymentEvent, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let event = db::events::event_by_order_id(order_id, &mut *tx)
            .await?
            .ok_or_else(|| SettlementError::EventNotFound(order_id.to_string()))?;
        if event.direction != Direction::Debit {
            return Err(SettlementError::ValidationError(format!("{order_id} is not a withdrawal")));
        }
        let target = resolution.target_status();
        if event.status == target {
            // Provider callbacks are delivered at-least-once; a replay is a no-op.
            debug!("🗃️ Withdrawal {order_id} is already {target}; ignoring replayed resolution");
            return Ok(event);
        }
        let updated = match resolution {
            WithdrawalResolution::Completed { provider_ref } => {
                let updated = db::events::update_event_status(event.id, EventStatus::Completed, None, &mut *tx).await?;
                if let Some(r) = provider_ref {
                    trace!("🗃️ Provider reference for {order_id}: {r}");
                }
                updated
            },
            WithdrawalResolution::Failed { error_code, error_message } => {
                let updated = db::events::update_event_status(
                    event.id,
                    EventStatus::Failed,
                    Some((error_code.as_str(), error_message.as_str())),
                    &mut *tx,
                )
                .await?;
                return_debited_funds(&event, "provider reported failure", &mut *tx).await?;
                updated
            },
            WithdrawalResolution::Cancelled { reason } => {
                let updated = db::events::update_event_status(
                    event.id,
                    EventStatus::Cancelled,
                    Some(("cancelled", reason.as_str())),
                    &mut *tx,
                )
                .await?;
                return_debited_funds(&event, reason, &mut *tx).await?;
                updated
            },
        };
        tx.commit().await.map_err(Self::commit_err)?;
        info!("🗃️ Withdrawal {order_id} resolved to {target}");
        Ok(updated)
    }

    async fn refund_credit(&self, order_id: &OrderId, reason: &str) -> Result<PaymentEvent, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let event = db::events::credit_by_order_id(order_id, &mut *tx)
            .await?
            .ok_or_else(|| SettlementError::EventNotFound(order_id.to_string()))?;
        if !event.status.can_transition_to(EventStatus::Refunded) {
            return Err(SettlementError::InvalidStatusChange { from: event.status, to: EventStatus::Refunded });
        }
        let account = db::accounts::account_by_id(event.account_id, &mut *tx)
            .await?
            .ok_or(SettlementError::AccountNotFound(event.account_id))?;
        if account.balance < event.net_amount {
            return Err(SettlementError::InsufficientBalance {
                available: account.balance,
                requested: event.net_amount,
            });
        }
        let new_balance = account.balance - event.net_amount;
        db::accounts::apply_balance_delta(event.account_id, account.version, new_balance, &mut *tx).await?;
        let compensating_id = OrderId::from(format!("rfd-{order_id}"));
        let metadata = EventMetadata::Refund { original_order_id: event.order_id.clone(), reason: reason.to_string() };
        let compensating = db::events::insert_event(
            db::events::NewEventRecord {
                order_id: &compensating_id,
                client_order_id: None,
                account_id: event.account_id,
                direction: Direction::Debit,
                status: EventStatus::Completed,
                gross_amount: event.net_amount,
                charge_amount: Money::zero(),
                net_amount: event.net_amount,
                amount_after_fee: None,
                previous_balance: account.balance,
                new_balance,
                currency: &event.currency,
                metadata: &metadata,
            },
            &mut *tx,
        )
        .await?;
        db::events::update_event_status(event.id, EventStatus::Refunded, None, &mut *tx).await?;
        tx.commit().await.map_err(Self::commit_err)?;
        info!("🗃️ Refunded credit {order_id}: {} returned to payer", event.net_amount);
        Ok(compensating)
    }

    async fn record_delivery(&self, attempt: NewDeliveryAttempt) -> Result<WebhookDeliveryAttempt, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::deliveries::insert_delivery(attempt, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), SettlementError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Returns the full debited amount to the merchant balance after a failed or cancelled
/// withdrawal, writing the compensating credit record in the caller's transaction.
async fn return_debited_funds(
    event: &PaymentEvent,
    reason: &str,
    tx: &mut sqlx::SqliteConnection,
) -> Result<(), SettlementError> {
    let account = db::accounts::account_by_id(event.account_id, &mut *tx)
        .await?
        .ok_or(SettlementError::AccountNotFound(event.account_id))?;
    let new_balance = account.balance + event.gross_amount;
    db::accounts::apply_balance_delta(event.account_id, account.version, new_balance, &mut *tx).await?;
    let compensating_id = OrderId::from(format!("rev-{}", event.order_id));
    let metadata = EventMetadata::Refund { original_order_id: event.order_id.clone(), reason: reason.to_string() };
    db::events::insert_event(
        db::events::NewEventRecord {
            order_id: &compensating_id,
            client_order_id: None,
            account_id: event.account_id,
            direction: Direction::Credit,
            status: EventStatus::Completed,
            gross_amount: event.gross_amount,
            charge_amount: Money::zero(),
            net_amount: event.gross_amount,
            amount_after_fee: None,
            previous_balance: account.balance,
            new_balance,
            currency: &event.currency,
            metadata: &metadata,
        },
        &mut *tx,
    )
    .await?;
    debug!("🗃️ Returned {} to account #{} for {}", event.gross_amount, event.account_id, event.order_id);
    Ok(())
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_account(&self, account_id: i64) -> Result<Option<MerchantAccount>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::accounts::account_by_id(account_id, &mut conn).await
    }

    async fn fetch_account_by_api_key(&self, api_key: &str) -> Result<Option<MerchantAccount>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::accounts::account_by_api_key(api_key, &mut conn).await
    }

    async fn create_account(&self, account: NewMerchantAccount) -> Result<MerchantAccount, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::accounts::insert_account(account, &mut conn).await
    }

    async fn register_binding(
        &self,
        binding: NewVirtualAccountBinding,
    ) -> Result<VirtualAccountBinding, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::bindings::insert_binding(binding, &mut conn).await
    }

    async fn fetch_history(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentEvent>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::events::events_for_account(account_id, limit, offset, &mut conn).await
    }

    async fn fetch_deliveries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDeliveryAttempt>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        db::deliveries::deliveries_for_account(account_id, limit, offset, &mut conn).await
    }
}

//! The write half of the engine: credit settlement, withdrawals and refunds.

use chrono::{Duration, Utc};
use log::*;
use mpg_common::{helpers::mask_account, SETTLEMENT_CURRENCY_CODE};

use crate::{
    db_types::{EventStatus, NewCredit, NewWithdrawal, OrderId, PaymentEvent, WithdrawalResolution},
    events::{EventProducers, SettlementEvent, SettlementEventType},
    fees::{self, FeeDefaults},
    traits::{AccountManagement, SettlementDatabase, SettlementError},
};

/// How many times a lost optimistic-concurrency race is retried before the conflict is returned
/// to the caller.
const MAX_OCC_RETRIES: usize = 3;

#[derive(Debug)]
pub struct CreditSettlement {
    pub event: PaymentEvent,
    /// True when this exact provider event had already been settled and `event` is the prior
    /// record. The caller must acknowledge identically in both cases.
    pub already_processed: bool,
}

/// `SettlementApi` orchestrates payment-event reconciliation over any storage backend.
///
/// It owns the business rules that sit above storage: replay detection, account routing, fee
/// computation, the retry-after-cooldown policy and the bounded retry loop around version
/// conflicts. Committed outcomes are published to the event producers for the outbound
/// notifier; publishing failure never affects the ledger.
pub struct SettlementApi<B> {
    db: B,
    producers: EventProducers,
    fee_defaults: FeeDefaults,
    retry_cooldown: Duration,
}

impl<B: std::fmt::Debug> std::fmt::Debug for SettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi ({:?})", self.db)
    }
}

impl<B> SettlementApi<B>
where B: SettlementDatabase + AccountManagement
{
    pub fn new(db: B, producers: EventProducers, fee_defaults: FeeDefaults, retry_cooldown: Duration) -> Self {
        Self { db, producers, fee_defaults, retry_cooldown }
    }

    async fn publish(&self, event_type: SettlementEventType, event: PaymentEvent) {
        trace!("🛍️️ Publishing {event_type} for {}", event.order_id);
        for producer in &self.producers.settlement_producers {
            producer.publish_event(SettlementEvent::new(event_type, event.clone())).await;
        }
    }

    /// Settles a verified inbound collection against the merchant bound to its virtual account.
    ///
    /// Replays of an already-settled provider event return the prior record with
    /// `already_processed = true` and touch nothing. A concurrent duplicate that loses the race
    /// on the unique index is treated the same way.
    pub async fn process_credit(&self, credit: NewCredit) -> Result<CreditSettlement, SettlementError> {
        if !credit.gross_amount.is_positive() {
            return Err(SettlementError::ValidationError(format!(
                "Credit amount must be positive, got {}",
                credit.gross_amount
            )));
        }
        if !credit.currency.eq_ignore_ascii_case(SETTLEMENT_CURRENCY_CODE) {
            return Err(SettlementError::ValidationError(format!("Unsupported currency {}", credit.currency)));
        }
        if let Some(prior) = self.db.fetch_credit_event(&credit.order_id).await? {
            info!("🛍️️ Credit {} has already been settled; acknowledging replay", credit.order_id);
            return Ok(CreditSettlement { event: prior, already_processed: true });
        }
        let masked = mask_account(&credit.account_number);
        let binding = self
            .db
            .fetch_binding(&credit.account_number)
            .await?
            .ok_or_else(|| SettlementError::BindingNotFound(masked.clone()))?;
        let account = self
            .db
            .fetch_account(binding.account_id)
            .await?
            .ok_or(SettlementError::AccountNotFound(binding.account_id))?;
        if !account.is_active() {
            warn!("🛍️️ Dropping credit {} for {} account #{}", credit.order_id, account.status, account.id);
            return Err(SettlementError::AccountNotActive(account.id));
        }
        let charge = fees::payment_charge(credit.gross_amount, Some(&account.payment_fee.0), &self.fee_defaults);
        debug!(
            "🛍️️ Crediting {} to account #{} via {masked}: gross {}, charge {}, net {}",
            credit.order_id, account.id, charge.gross, charge.charge, charge.net
        );
        let mut attempts = 0;
        let event = loop {
            match self.db.settle_credit(&credit, account.id, charge).await {
                Ok(event) => break event,
                Err(SettlementError::VersionConflict) if attempts < MAX_OCC_RETRIES => {
                    attempts += 1;
                    debug!("🛍️️ Retrying credit {} after version conflict (attempt {attempts})", credit.order_id);
                },
                Err(SettlementError::DuplicateEvent) => {
                    // A concurrent handler settled the same provider event first.
                    let prior = self
                        .db
                        .fetch_credit_event(&credit.order_id)
                        .await?
                        .ok_or(SettlementError::DuplicateEvent)?;
                    info!("🛍️️ Credit {} was settled concurrently; acknowledging replay", credit.order_id);
                    return Ok(CreditSettlement { event: prior, already_processed: true });
                },
                Err(e) => return Err(e),
            }
        };
        self.publish(SettlementEventType::CollectionCompleted, event.clone()).await;
        Ok(CreditSettlement { event, already_processed: false })
    }

    /// Accepts a merchant withdrawal: debits the full requested amount and records a `Pending`
    /// event carrying the net payout. The provider's verdict arrives later via
    /// [`Self::finalize_withdrawal`].
    pub async fn process_withdrawal(&self, withdrawal: NewWithdrawal) -> Result<PaymentEvent, SettlementError> {
        if !withdrawal.gross_amount.is_positive() {
            return Err(SettlementError::ValidationError(format!(
                "Withdrawal amount must be positive, got {}",
                withdrawal.gross_amount
            )));
        }
        let account = self
            .db
            .fetch_account(withdrawal.account_id)
            .await?
            .ok_or(SettlementError::AccountNotFound(withdrawal.account_id))?;
        if !account.is_active() {
            return Err(SettlementError::AccountNotActive(account.id));
        }
        if let Some(prior) = self.db.fetch_withdrawal_event(account.id, &withdrawal.client_order_id).await? {
            match prior.status {
                EventStatus::Pending => return Err(SettlementError::WithdrawalInProgress),
                EventStatus::Completed | EventStatus::Refunded => {
                    info!(
                        "🛍️️ Withdrawal {} for account #{} is already settled; returning the prior record",
                        withdrawal.client_order_id, account.id
                    );
                    return Ok(prior);
                },
                EventStatus::Failed | EventStatus::Cancelled => {
                    self.check_retry_cooldown(&prior)?;
                    debug!(
                        "🛍️️ Allowing retry of withdrawal {} for account #{}",
                        withdrawal.client_order_id, account.id
                    );
                },
            }
        }
        let fee = fees::withdrawal_fee(withdrawal.gross_amount, Some(&account.withdrawal_fee.0), &self.fee_defaults)
            .ok_or_else(|| {
                SettlementError::ValidationError(format!("No fee tier covers a withdrawal of {}", withdrawal.gross_amount))
            })?;
        if !(withdrawal.gross_amount - fee).is_positive() {
            return Err(SettlementError::ValidationError(format!(
                "Withdrawal of {} does not cover the {fee} fee",
                withdrawal.gross_amount
            )));
        }
        let order_id = new_order_reference();
        let mut attempts = 0;
        let event = loop {
            match self.db.debit_for_withdrawal(&withdrawal, &order_id, fee).await {
                Ok(event) => break event,
                Err(SettlementError::VersionConflict) if attempts < MAX_OCC_RETRIES => {
                    attempts += 1;
                    debug!(
                        "🛍️️ Retrying withdrawal {} after version conflict (attempt {attempts})",
                        withdrawal.client_order_id
                    );
                },
                Err(SettlementError::DuplicateEvent) => return Err(SettlementError::WithdrawalInProgress),
                Err(e) => return Err(e),
            }
        };
        Ok(event)
    }

    /// Applies the provider's verdict to a pending withdrawal and notifies the merchant.
    pub async fn finalize_withdrawal(
        &self,
        order_id: &OrderId,
        resolution: WithdrawalResolution,
    ) -> Result<PaymentEvent, SettlementError> {
        let mut attempts = 0;
        let event = loop {
            match self.db.finalize_withdrawal(order_id, &resolution).await {
                Ok(event) => break event,
                Err(SettlementError::VersionConflict) if attempts < MAX_OCC_RETRIES => {
                    attempts += 1;
                },
                Err(e) => return Err(e),
            }
        };
        let event_type = match event.status {
            EventStatus::Completed => SettlementEventType::WithdrawalCompleted,
            EventStatus::Cancelled => SettlementEventType::WithdrawalCancelled,
            _ => SettlementEventType::WithdrawalFailed,
        };
        self.publish(event_type, event.clone()).await;
        Ok(event)
    }

    /// Refunds a completed credit in full (net amount) and returns the compensating record.
    pub async fn refund_credit(&self, order_id: &OrderId, reason: &str) -> Result<PaymentEvent, SettlementError> {
        let mut attempts = 0;
        let compensating = loop {
            match self.db.refund_credit(order_id, reason).await {
                Ok(event) => break event,
                Err(SettlementError::VersionConflict) if attempts < MAX_OCC_RETRIES => {
                    attempts += 1;
                },
                Err(e) => return Err(e),
            }
        };
        self.publish(SettlementEventType::CollectionRefunded, compensating.clone()).await;
        Ok(compensating)
    }

    fn check_retry_cooldown(&self, prior: &PaymentEvent) -> Result<(), SettlementError> {
        let since = prior.failed_at.or(prior.cancelled_at).unwrap_or(prior.updated_at);
        let elapsed = Utc::now() - since;
        if elapsed < self.retry_cooldown {
            let remaining = (self.retry_cooldown - elapsed).num_seconds().max(1);
            return Err(SettlementError::RetryCooldown(remaining));
        }
        Ok(())
    }
}

/// A fresh gateway reference for an outbound withdrawal. This is the order id the provider sees
/// and echoes back in its status callback.
fn new_order_reference() -> OrderId {
    OrderId(format!("wd-{:016x}", rand::random::<u64>()))
}

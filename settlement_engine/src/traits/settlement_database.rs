use crate::{
    db_types::{
        NewCredit,
        NewDeliveryAttempt,
        NewWithdrawal,
        OrderId,
        PaymentEvent,
        VirtualAccountBinding,
        WebhookDeliveryAttempt,
        WithdrawalResolution,
    },
    fees::Charge,
    traits::SettlementError,
};
use mpg_common::Money;

/// The core settlement contract.
///
/// Implementations must guarantee that every balance mutation and its matching [`PaymentEvent`]
/// record commit atomically, that balance updates are guarded by the account version
/// (returning [`SettlementError::VersionConflict`] when the guard fails), and that the
/// natural-key uniqueness of events is enforced at the storage layer.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone {
    /// The database URL in use. Bear in mind that this may contain sensitive information.
    fn url(&self) -> &str;

    /// Returns the completed (or otherwise settled) credit record for a provider order id, if
    /// one exists. Used for replay detection before attempting settlement.
    async fn fetch_credit_event(&self, order_id: &OrderId) -> Result<Option<PaymentEvent>, SettlementError>;

    /// Returns the most recent withdrawal record for `(account, client order id)`, if any.
    async fn fetch_withdrawal_event(
        &self,
        account_id: i64,
        client_order_id: &OrderId,
    ) -> Result<Option<PaymentEvent>, SettlementError>;

    async fn fetch_binding(&self, account_number: &str) -> Result<Option<VirtualAccountBinding>, SettlementError>;

    /// Credits a merchant balance and writes the `Completed` settlement record in one
    /// transaction. `charge` carries the already-computed fee split for the event.
    async fn settle_credit(
        &self,
        credit: &NewCredit,
        account_id: i64,
        charge: Charge,
    ) -> Result<PaymentEvent, SettlementError>;

    /// Debits a merchant balance and writes the `Pending` withdrawal record in one transaction.
    /// `order_id` is the gateway-assigned reference sent to the provider; `fee` is the flat
    /// withdrawal fee.
    async fn debit_for_withdrawal(
        &self,
        withdrawal: &NewWithdrawal,
        order_id: &OrderId,
        fee: Money,
    ) -> Result<PaymentEvent, SettlementError>;

    /// Applies a provider's verdict to a pending withdrawal. Failure and cancellation return the
    /// debited gross amount to the balance (as a compensating credit record) in the same
    /// transaction as the status change.
    async fn finalize_withdrawal(
        &self,
        order_id: &OrderId,
        resolution: &WithdrawalResolution,
    ) -> Result<PaymentEvent, SettlementError>;

    /// Refunds a completed credit: debits the balance by the original net amount, writes a
    /// compensating record, and moves the original to `Refunded`, all in one transaction.
    /// Returns the compensating record.
    async fn refund_credit(&self, order_id: &OrderId, reason: &str) -> Result<PaymentEvent, SettlementError>;

    async fn record_delivery(&self, attempt: NewDeliveryAttempt) -> Result<WebhookDeliveryAttempt, SettlementError>;

    /// Closes the connection(s) to the database.
    async fn close(&mut self) -> Result<(), SettlementError>;
}

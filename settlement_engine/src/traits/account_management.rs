use crate::{
    db_types::{
        MerchantAccount,
        NewMerchantAccount,
        NewVirtualAccountBinding,
        PaymentEvent,
        VirtualAccountBinding,
        WebhookDeliveryAttempt,
    },
    traits::SettlementError,
};

/// Read and admin access to merchant accounts, bindings and histories.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    async fn fetch_account(&self, account_id: i64) -> Result<Option<MerchantAccount>, SettlementError>;

    /// Looks a merchant up by its API key. Used by the server's authentication layer.
    async fn fetch_account_by_api_key(&self, api_key: &str) -> Result<Option<MerchantAccount>, SettlementError>;

    async fn create_account(&self, account: NewMerchantAccount) -> Result<MerchantAccount, SettlementError>;

    /// Binds a provider virtual account number to a merchant. Duplicate account numbers are
    /// rejected with [`SettlementError::DuplicateEvent`].
    async fn register_binding(
        &self,
        binding: NewVirtualAccountBinding,
    ) -> Result<VirtualAccountBinding, SettlementError>;

    /// The settlement history for an account, newest first.
    async fn fetch_history(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentEvent>, SettlementError>;

    /// The outbound notification log for an account, newest first.
    async fn fetch_deliveries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WebhookDeliveryAttempt>, SettlementError>;
}

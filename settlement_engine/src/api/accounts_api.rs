//! The read-and-admin half of the engine: account lookups, histories and bindings.

use crate::{
    db_types::{
        MerchantAccount,
        NewMerchantAccount,
        NewVirtualAccountBinding,
        PaymentEvent,
        VirtualAccountBinding,
        WebhookDeliveryAttempt,
    },
    traits::{AccountManagement, SettlementError},
};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone)]
pub struct AccountApi<B> {
    db: B,
}

impl<B> AccountApi<B>
where B: AccountManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn account_by_id(&self, account_id: i64) -> Result<MerchantAccount, SettlementError> {
        self.db.fetch_account(account_id).await?.ok_or(SettlementError::AccountNotFound(account_id))
    }

    pub async fn account_by_api_key(&self, api_key: &str) -> Result<Option<MerchantAccount>, SettlementError> {
        self.db.fetch_account_by_api_key(api_key).await
    }

    pub async fn create_account(&self, account: NewMerchantAccount) -> Result<MerchantAccount, SettlementError> {
        self.db.create_account(account).await
    }

    pub async fn register_binding(
        &self,
        binding: NewVirtualAccountBinding,
    ) -> Result<VirtualAccountBinding, SettlementError> {
        self.db.register_binding(binding).await
    }

    pub async fn history(
        &self,
        account_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<PaymentEvent>, SettlementError> {
        let (limit, offset) = clamp_page(limit, offset);
        self.db.fetch_history(account_id, limit, offset).await
    }

    pub async fn deliveries(
        &self,
        account_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<WebhookDeliveryAttempt>, SettlementError> {
        let (limit, offset) = clamp_page(limit, offset);
        self.db.fetch_deliveries(account_id, limit, offset).await
    }
}

fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

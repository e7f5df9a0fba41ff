use chrono::Utc;
use mockall::mock;
use mpg_common::Money;
use settlement_engine::{
    db_types::{
        AccountStatus,
        Direction,
        EventMetadata,
        EventStatus,
        Json,
        MerchantAccount,
        NewCredit,
        NewDeliveryAttempt,
        NewMerchantAccount,
        NewVirtualAccountBinding,
        NewWithdrawal,
        OrderId,
        PaymentEvent,
        PaymentFeeConfig,
        VirtualAccountBinding,
        WebhookDeliveryAttempt,
        WithdrawalFeeConfig,
        WithdrawalResolution,
    },
    fees::Charge,
    traits::{AccountManagement, SettlementDatabase, SettlementError},
};

mock! {
    pub SettlementBackend {}

    impl Clone for SettlementBackend {
        fn clone(&self) -> Self;
    }

    impl SettlementDatabase for SettlementBackend {
        fn url(&self) -> &str;
        async fn fetch_credit_event(&self, order_id: &OrderId) -> Result<Option<PaymentEvent>, SettlementError>;
        async fn fetch_withdrawal_event(&self, account_id: i64, client_order_id: &OrderId) -> Result<Option<PaymentEvent>, SettlementError>;
        async fn fetch_binding(&self, account_number: &str) -> Result<Option<VirtualAccountBinding>, SettlementError>;
        async fn settle_credit(&self, credit: &NewCredit, account_id: i64, charge: Charge) -> Result<PaymentEvent, SettlementError>;
        async fn debit_for_withdrawal(&self, withdrawal: &NewWithdrawal, order_id: &OrderId, fee: Money) -> Result<PaymentEvent, SettlementError>;
        async fn finalize_withdrawal(&self, order_id: &OrderId, resolution: &WithdrawalResolution) -> Result<PaymentEvent, SettlementError>;
        async fn refund_credit(&self, order_id: &OrderId, reason: &str) -> Result<PaymentEvent, SettlementError>;
        async fn record_delivery(&self, attempt: NewDeliveryAttempt) -> Result<WebhookDeliveryAttempt, SettlementError>;
        async fn close(&mut self) -> Result<(), SettlementError>;
    }

    impl AccountManagement for SettlementBackend {
        async fn fetch_account(&self, account_id: i64) -> Result<Option<MerchantAccount>, SettlementError>;
        async fn fetch_account_by_api_key(&self, api_key: &str) -> Result<Option<MerchantAccount>, SettlementError>;
        async fn create_account(&self, account: NewMerchantAccount) -> Result<MerchantAccount, SettlementError>;
        async fn register_binding(&self, binding: NewVirtualAccountBinding) -> Result<VirtualAccountBinding, SettlementError>;
        async fn fetch_history(&self, account_id: i64, limit: i64, offset: i64) -> Result<Vec<PaymentEvent>, SettlementError>;
        async fn fetch_deliveries(&self, account_id: i64, limit: i64, offset: i64) -> Result<Vec<WebhookDeliveryAttempt>, SettlementError>;
    }
}

pub fn merchant(id: i64, status: AccountStatus) -> MerchantAccount {
    MerchantAccount {
        id,
        user_id: format!("merchant-{id}"),
        status,
        balance: Money::zero(),
        version: 0,
        api_key: format!("mk_{id}"),
        secret_key_enc: String::new(),
        webhook_url: None,
        payment_fee: Json(PaymentFeeConfig { use_default: true, ..Default::default() }),
        withdrawal_fee: Json(WithdrawalFeeConfig { use_default: true, ..Default::default() }),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn binding(account_id: i64, account_number: &str) -> VirtualAccountBinding {
    VirtualAccountBinding {
        id: 1,
        account_number: account_number.to_string(),
        account_id,
        customer_email: "ada@example.com".to_string(),
        customer_name: "Ada Lovelace".to_string(),
        provider_ref: None,
        created_at: Utc::now(),
    }
}

/// A settled credit record for `order_id`, with the fee split in `charge` and a conserved
/// balance snapshot starting from zero.
pub fn settled_credit(order_id: &str, account_id: i64, charge: Charge) -> PaymentEvent {
    PaymentEvent {
        id: 1,
        order_id: OrderId::from(order_id),
        client_order_id: None,
        account_id,
        direction: Direction::Credit,
        status: EventStatus::Completed,
        gross_amount: charge.gross,
        charge_amount: charge.charge,
        net_amount: charge.net,
        amount_after_fee: None,
        previous_balance: Money::zero(),
        new_balance: charge.net,
        currency: mpg_common::SETTLEMENT_CURRENCY_CODE.to_string(),
        metadata: Json(EventMetadata::default()),
        error_code: None,
        error_message: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        completed_at: Some(Utc::now()),
        failed_at: None,
        cancelled_at: None,
    }
}

/// A withdrawal record for `order_id` in the given status.
pub fn withdrawal(order_id: &str, account_id: i64, status: EventStatus) -> PaymentEvent {
    let gross = Money::from_major(100);
    let fee = Money::from_major(20);
    PaymentEvent {
        id: 2,
        order_id: OrderId::from(order_id),
        client_order_id: Some(OrderId::from("client-1")),
        account_id,
        direction: Direction::Debit,
        status,
        gross_amount: gross,
        charge_amount: fee,
        net_amount: gross - fee,
        amount_after_fee: Some(gross - fee),
        previous_balance: gross,
        new_balance: Money::zero(),
        currency: mpg_common::SETTLEMENT_CURRENCY_CODE.to_string(),
        metadata: Json(EventMetadata::default()),
        error_code: None,
        error_message: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        completed_at: (status == EventStatus::Completed).then(Utc::now),
        failed_at: None,
        cancelled_at: None,
    }
}

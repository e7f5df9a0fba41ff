//! Database type definitions for the settlement engine.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use mpg_common::Money;
use serde::{Deserialize, Serialize};
pub use sqlx::types::Json;
use sqlx::{FromRow, Type};

use crate::traits::SettlementError;

//--------------------------------------     OrderId        ---------------------------------------------------------

/// A provider- or merchant-assigned order reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Type, PartialOrd, Ord)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl From<String> for OrderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

//--------------------------------------   AccountStatus    ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum AccountStatus {
    Active,
    Suspended,
    Blocked,
}

impl Display for AccountStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "Active",
            Self::Suspended => "Suspended",
            Self::Blocked => "Blocked",
        };
        f.write_str(s)
    }
}

//--------------------------------------     Direction      ---------------------------------------------------------

/// Whether a payment event moves money into or out of the merchant balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum Direction {
    Credit,
    Debit,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credit => f.write_str("Credit"),
            Self::Debit => f.write_str("Debit"),
        }
    }
}

//--------------------------------------    EventStatus     ---------------------------------------------------------

/// Lifecycle state of a payment event.
///
/// `Pending` may move to `Completed`, `Failed` or `Cancelled`. A `Completed` credit may move to
/// `Refunded`. Terminal states never change again; amounts on a record never change after
/// insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum EventStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl EventStatus {
    /// Whether a record in `self` may transition to `next`.
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed) |
                (Self::Pending, Self::Failed) |
                (Self::Pending, Self::Cancelled) |
                (Self::Completed, Self::Refunded)
        )
    }
}

impl Display for EventStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::Refunded => "Refunded",
        };
        f.write_str(s)
    }
}

//--------------------------------------   Fee policies     ---------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeType {
    #[default]
    Percentage,
    Fixed,
}

/// Per-merchant policy for inbound payment (collection) charges.
///
/// `use_default` defers to the platform-wide percentage and cap, except that non-zero
/// `percentage`/`cap` fields on the policy override the platform values even then.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentFeeConfig {
    #[serde(default)]
    pub use_default: bool,
    #[serde(default)]
    pub fee_type: FeeType,
    #[serde(default)]
    pub percentage: rust_decimal::Decimal,
    #[serde(default)]
    pub cap: Money,
    #[serde(default)]
    pub fixed: Money,
}

/// One banded withdrawal fee: a flat fee for gross amounts in `[min, max]` (inclusive;
/// `max = None` means unbounded above).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeTier {
    pub min: Money,
    pub max: Option<Money>,
    pub fee: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalFeeConfig {
    #[serde(default)]
    pub use_default: bool,
    #[serde(default)]
    pub tiers: Vec<FeeTier>,
}

//--------------------------------------  MerchantAccount   ---------------------------------------------------------

/// A merchant ledger account.
///
/// `balance` is only ever changed through the optimistic-concurrency update in the sqlite layer,
/// which bumps `version` on every successful mutation.
#[derive(Debug, Clone, FromRow)]
pub struct MerchantAccount {
    pub id: i64,
    pub user_id: String,
    pub status: AccountStatus,
    pub balance: Money,
    pub version: i64,
    pub api_key: String,
    /// AES-GCM blob of the merchant webhook signing secret.
    pub secret_key_enc: String,
    pub webhook_url: Option<String>,
    pub payment_fee: Json<PaymentFeeConfig>,
    pub withdrawal_fee: Json<WithdrawalFeeConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MerchantAccount {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewMerchantAccount {
    pub user_id: String,
    pub api_key: String,
    pub secret_key_enc: String,
    pub webhook_url: Option<String>,
    pub payment_fee: PaymentFeeConfig,
    pub withdrawal_fee: WithdrawalFeeConfig,
}

//--------------------------------------  Virtual accounts  ---------------------------------------------------------

/// Binding from a provider virtual account number to the merchant it settles into.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VirtualAccountBinding {
    pub id: i64,
    pub account_number: String,
    pub account_id: i64,
    pub customer_email: String,
    pub customer_name: String,
    pub provider_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVirtualAccountBinding {
    pub account_number: String,
    pub account_id: i64,
    pub customer_email: String,
    pub customer_name: String,
    pub provider_ref: Option<String>,
}

//--------------------------------------   Event metadata   ---------------------------------------------------------

/// Contextual payload stored alongside a payment event, keyed by event kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventMetadata {
    Collection {
        payer_name: String,
        payer_account: String,
        bank_name: String,
        session_id: Option<String>,
    },
    Disbursement {
        beneficiary_account: String,
        beneficiary_bank: String,
        beneficiary_name: String,
        provider_ref: Option<String>,
    },
    Refund {
        original_order_id: OrderId,
        reason: String,
    },
    Other {
        #[serde(default)]
        detail: serde_json::Value,
    },
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::Other { detail: serde_json::Value::Null }
    }
}

//--------------------------------------   PaymentEvent     ---------------------------------------------------------

/// An immutable settlement record.
///
/// One row is written per accepted provider event or merchant withdrawal. Amounts and balance
/// snapshots are fixed at insert time; only `status` (and its timestamp columns) move, and only
/// along [`EventStatus::can_transition_to`].
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentEvent {
    pub id: i64,
    pub order_id: OrderId,
    pub client_order_id: Option<OrderId>,
    pub account_id: i64,
    pub direction: Direction,
    pub status: EventStatus,
    /// The face value of the event, before any charge.
    pub gross_amount: Money,
    pub charge_amount: Money,
    /// Amount applied to the balance for credits (`gross - charge`).
    pub net_amount: Money,
    /// For withdrawals: the amount handed to the provider (`gross - charge`).
    pub amount_after_fee: Option<Money>,
    pub previous_balance: Money,
    pub new_balance: Money,
    pub currency: String,
    pub metadata: Json<EventMetadata>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl PaymentEvent {
    /// Checks the conservation invariant for this record.
    pub fn conserves_balance(&self) -> bool {
        match self.direction {
            Direction::Credit => self.previous_balance + self.net_amount == self.new_balance,
            Direction::Debit => self.previous_balance - self.gross_amount == self.new_balance,
        }
    }
}

impl Display for PaymentEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} of {} {} for account {} ({})",
            self.status, self.direction, self.gross_amount, self.currency, self.account_id, self.order_id
        )
    }
}

//--------------------------------------  New event inputs  ---------------------------------------------------------

/// A verified inbound collection, ready for settlement.
#[derive(Debug, Clone)]
pub struct NewCredit {
    pub order_id: OrderId,
    pub account_number: String,
    pub gross_amount: Money,
    pub currency: String,
    pub metadata: EventMetadata,
}

/// A merchant withdrawal request, validated at the API edge.
#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub account_id: i64,
    pub client_order_id: OrderId,
    pub gross_amount: Money,
    pub metadata: EventMetadata,
}

/// How a pending withdrawal was concluded by the provider.
#[derive(Debug, Clone)]
pub enum WithdrawalResolution {
    Completed { provider_ref: Option<String> },
    Failed { error_code: String, error_message: String },
    Cancelled { reason: String },
}

impl WithdrawalResolution {
    pub fn target_status(&self) -> EventStatus {
        match self {
            Self::Completed { .. } => EventStatus::Completed,
            Self::Failed { .. } => EventStatus::Failed,
            Self::Cancelled { .. } => EventStatus::Cancelled,
        }
    }
}

//--------------------------------------    Deliveries      ---------------------------------------------------------

/// One attempt to notify a merchant endpoint of a settled event.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookDeliveryAttempt {
    pub id: i64,
    pub account_id: i64,
    pub event_type: String,
    pub order_id: OrderId,
    pub url: String,
    pub request_body: String,
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub duration_ms: i64,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeliveryAttempt {
    pub account_id: i64,
    pub event_type: String,
    pub order_id: OrderId,
    pub url: String,
    pub request_body: String,
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub duration_ms: i64,
    pub success: bool,
}

//--------------------------------------     Helpers        ---------------------------------------------------------

/// Serializes a fee policy for storage, surfacing the (unlikely) serde failure as a database
/// error rather than panicking.
pub fn to_json_string<T: Serialize>(value: &T) -> Result<String, SettlementError> {
    serde_json::to_string(value).map_err(|e| SettlementError::DatabaseError(format!("Could not serialize value: {e}")))
}

//! Wire types for the provider webhooks and the merchant API.

use mpg_common::Money;
use serde::{Deserialize, Serialize};
use settlement_engine::db_types::{EventMetadata, NewCredit, NewWithdrawal, OrderId, WithdrawalResolution};

/// Uniform acknowledgement body for webhook routes. Providers treat any 200 as delivered, so
/// both success and failure acks ride on this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// An inbound collection event, as the provider posts it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCollectionEvent {
    pub order_no: String,
    /// Major-unit decimal string, e.g. "100.00".
    pub amount: String,
    pub currency: String,
    pub virtual_account_no: String,
    /// Provider status code; "00" is a successful collection.
    pub status: String,
    #[serde(default)]
    pub payer_name: String,
    #[serde(default)]
    pub payer_account_no: String,
    #[serde(default)]
    pub payer_bank_name: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub sign: String,
}

pub const PROVIDER_SUCCESS_CODE: &str = "00";

impl ProviderCollectionEvent {
    pub fn is_successful(&self) -> bool {
        self.status == PROVIDER_SUCCESS_CODE
    }

    /// Converts the verified payload into an engine credit. Fails on an unparseable amount.
    pub fn to_new_credit(&self) -> Result<NewCredit, String> {
        let gross_amount = self.amount.parse::<Money>().map_err(|e| e.to_string())?;
        Ok(NewCredit {
            order_id: OrderId::from(self.order_no.as_str()),
            account_number: self.virtual_account_no.clone(),
            gross_amount,
            currency: self.currency.clone(),
            metadata: EventMetadata::Collection {
                payer_name: self.payer_name.clone(),
                payer_account: self.payer_account_no.clone(),
                bank_name: self.payer_bank_name.clone(),
                session_id: self.session_id.clone(),
            },
        })
    }
}

/// The provider's verdict on a disbursement we asked it to make.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderWithdrawalCallback {
    /// The gateway reference we supplied with the disbursement request.
    pub order_no: String,
    pub status: String,
    #[serde(default)]
    pub provider_ref: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub sign: String,
}

impl ProviderWithdrawalCallback {
    pub fn order_id(&self) -> OrderId {
        OrderId::from(self.order_no.as_str())
    }

    pub fn resolution(&self) -> WithdrawalResolution {
        match self.status.to_uppercase().as_str() {
            PROVIDER_SUCCESS_CODE | "SUCCESS" => {
                WithdrawalResolution::Completed { provider_ref: self.provider_ref.clone() }
            },
            "CANCELLED" => WithdrawalResolution::Cancelled {
                reason: self.error_message.clone().unwrap_or_else(|| "cancelled by provider".to_string()),
            },
            _ => WithdrawalResolution::Failed {
                error_code: self.error_code.clone().unwrap_or_else(|| self.status.clone()),
                error_message: self.error_message.clone().unwrap_or_else(|| "disbursement failed".to_string()),
            },
        }
    }
}

/// A merchant withdrawal request on `POST /api/withdraw`.
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    /// The merchant's own idempotency reference for this withdrawal.
    pub client_order_id: String,
    /// Major-unit decimal string.
    pub amount: String,
    pub beneficiary_account: String,
    pub beneficiary_bank: String,
    pub beneficiary_name: String,
}

impl WithdrawalRequest {
    pub fn to_new_withdrawal(&self, account_id: i64) -> Result<NewWithdrawal, String> {
        let gross_amount = self.amount.parse::<Money>().map_err(|e| e.to_string())?;
        Ok(NewWithdrawal {
            account_id,
            client_order_id: OrderId::from(self.client_order_id.as_str()),
            gross_amount,
            metadata: EventMetadata::Disbursement {
                beneficiary_account: self.beneficiary_account.clone(),
                beneficiary_bank: self.beneficiary_bank.clone(),
                beneficiary_name: self.beneficiary_name.clone(),
                provider_ref: None,
            },
        })
    }
}

/// The merchant identity established by the API-key middleware, available to handlers via
/// request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedMerchant {
    pub account_id: i64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

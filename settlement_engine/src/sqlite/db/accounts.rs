use log::*;
use mpg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{to_json_string, MerchantAccount, NewMerchantAccount},
    traits::{is_unique_violation, SettlementError},
};

pub async fn account_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<MerchantAccount>, SettlementError> {
    let account = sqlx::query_as::<_, MerchantAccount>("SELECT * FROM merchant_accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

pub async fn account_by_api_key(
    api_key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantAccount>, SettlementError> {
    let account = sqlx::query_as::<_, MerchantAccount>("SELECT * FROM merchant_accounts WHERE api_key = ?")
        .bind(api_key)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

pub async fn insert_account(
    account: NewMerchantAccount,
    conn: &mut SqliteConnection,
) -> Result<MerchantAccount, SettlementError> {
    let payment_fee = to_json_string(&account.payment_fee)?;
    let withdrawal_fee = to_json_string(&account.withdrawal_fee)?;
    let res = sqlx::query(
        r#"INSERT INTO merchant_accounts (user_id, api_key, secret_key_enc, webhook_url, payment_fee, withdrawal_fee)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&account.user_id)
    .bind(&account.api_key)
    .bind(&account.secret_key_enc)
    .bind(&account.webhook_url)
    .bind(payment_fee)
    .bind(withdrawal_fee)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            SettlementError::ValidationError(format!("A merchant account for {} already exists", account.user_id))
        } else {
            e.into()
        }
    })?;
    let id = res.last_insert_rowid();
    debug!("🗃️ Created merchant account #{id} for user {}", account.user_id);
    account_by_id(id, conn).await?.ok_or(SettlementError::AccountNotFound(id))
}

/// The ledger mutation primitive. Writes the freshly computed balance only if nobody else has
/// touched the account since it was read (`version` match); the version bumps on success.
/// Zero rows affected means the caller lost the race.
pub async fn apply_balance_delta(
    account_id: i64,
    expected_version: i64,
    new_balance: Money,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    if new_balance.is_negative() {
        return Err(SettlementError::ValidationError(format!(
            "Refusing to set a negative balance on account {account_id}"
        )));
    }
    let res = sqlx::query(
        r#"UPDATE merchant_accounts SET balance = ?, version = version + 1, updated_at = CURRENT_TIMESTAMP
           WHERE id = ? AND version = ?"#,
    )
    .bind(new_balance)
    .bind(account_id)
    .bind(expected_version)
    .execute(conn)
    .await?;
    if res.rows_affected() == 0 {
        trace!("🗃️ Version guard failed for account #{account_id} (expected v{expected_version})");
        return Err(SettlementError::VersionConflict);
    }
    Ok(())
}

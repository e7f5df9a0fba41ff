use log::*;
use mpg_common::helpers::mask_account;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewVirtualAccountBinding, VirtualAccountBinding},
    traits::{is_unique_violation, SettlementError},
};

pub async fn binding_by_account_number(
    account_number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<VirtualAccountBinding>, SettlementError> {
    let binding = sqlx::query_as::<_, VirtualAccountBinding>("SELECT * FROM virtual_accounts WHERE account_number = ?")
        .bind(account_number)
        .fetch_optional(conn)
        .await?;
    Ok(binding)
}

pub async fn insert_binding(
    binding: NewVirtualAccountBinding,
    conn: &mut SqliteConnection,
) -> Result<VirtualAccountBinding, SettlementError> {
    let res = sqlx::query(
        r#"INSERT INTO virtual_accounts (account_number, account_id, customer_email, customer_name, provider_ref)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(&binding.account_number)
    .bind(binding.account_id)
    .bind(&binding.customer_email)
    .bind(&binding.customer_name)
    .bind(&binding.provider_ref)
    .execute(&mut *conn)
    .await
    .map_err(|e| if is_unique_violation(&e) { SettlementError::DuplicateEvent } else { e.into() })?;
    let id = res.last_insert_rowid();
    debug!(
        "🗃️ Bound virtual account {} to merchant #{}",
        mask_account(&binding.account_number),
        binding.account_id
    );
    let created = sqlx::query_as::<_, VirtualAccountBinding>("SELECT * FROM virtual_accounts WHERE id = ?")
        .bind(id)
        .fetch_one(conn)
        .await?;
    Ok(created)
}

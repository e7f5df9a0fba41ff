use sqlx::SqliteConnection;

use crate::{
    db_types::{NewDeliveryAttempt, WebhookDeliveryAttempt},
    traits::SettlementError,
};

pub async fn insert_delivery(
    attempt: NewDeliveryAttempt,
    conn: &mut SqliteConnection,
) -> Result<WebhookDeliveryAttempt, SettlementError> {
    let res = sqlx::query(
        r#"INSERT INTO webhook_deliveries (
               account_id, event_type, order_id, url, request_body,
               response_status, response_body, duration_ms, success
           ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(attempt.account_id)
    .bind(&attempt.event_type)
    .bind(&attempt.order_id)
    .bind(&attempt.url)
    .bind(&attempt.request_body)
    .bind(attempt.response_status)
    .bind(&attempt.response_body)
    .bind(attempt.duration_ms)
    .bind(attempt.success)
    .execute(&mut *conn)
    .await?;
    let delivery = sqlx::query_as::<_, WebhookDeliveryAttempt>("SELECT * FROM webhook_deliveries WHERE id = ?")
        .bind(res.last_insert_rowid())
        .fetch_one(conn)
        .await?;
    Ok(delivery)
}

pub async fn deliveries_for_account(
    account_id: i64,
    limit: i64,
    offset: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookDeliveryAttempt>, SettlementError> {
    let deliveries = sqlx::query_as::<_, WebhookDeliveryAttempt>(
        "SELECT * FROM webhook_deliveries WHERE account_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
    )
    .bind(account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(conn)
    .await?;
    Ok(deliveries)
}

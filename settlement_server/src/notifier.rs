//! Outbound merchant notifications.
//!
//! One delivery attempt per settlement event, no retries: settlement has already committed by
//! the time an event reaches this module, and a merchant who missed a notification has the
//! delivery log and the transaction listing to fall back on. Every attempt — success, non-2xx
//! or transport error — is recorded as a [`NewDeliveryAttempt`].

use std::time::Instant;

use chrono::Utc;
use log::*;
use mpg_common::crypto::{self, EncryptionKey};
use reqwest::Client;
use serde_json::json;
use settlement_engine::{
    db_types::NewDeliveryAttempt,
    events::SettlementEvent,
    traits::{AccountManagement, SettlementDatabase},
};

use crate::{errors::ServerError, helpers::calculate_hmac_hex};

/// Response bodies in the delivery log are capped at this many bytes.
const MAX_LOGGED_BODY: usize = 1024;

pub struct OutboundNotifier<B> {
    client: Client,
    db: B,
    encryption_key: EncryptionKey,
}

impl<B> OutboundNotifier<B>
where B: SettlementDatabase + AccountManagement
{
    /// `timeout` bounds each delivery attempt end to end.
    pub fn new(db: B, encryption_key: EncryptionKey, timeout: std::time::Duration) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not build the notifier HTTP client: {e}")))?;
        Ok(Self { client, db, encryption_key })
    }

    /// Delivers one settlement event to the owning merchant's webhook endpoint, if it has one.
    pub async fn handle_event(&self, ev: SettlementEvent) {
        let account_id = ev.event.account_id;
        let account = match self.db.fetch_account(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                error!("📮️ No account #{account_id} for settlement event {}; dropping notification", ev.event.order_id);
                return;
            },
            Err(e) => {
                error!("📮️ Could not load account #{account_id} for notification: {e}");
                return;
            },
        };
        let Some(url) = account.webhook_url.clone() else {
            debug!("📮️ Account #{account_id} has no webhook URL; skipping {}", ev.event_type);
            return;
        };
        let secret = match crypto::decrypt(&self.encryption_key, &account.secret_key_enc) {
            Ok(secret) => secret,
            Err(e) => {
                error!("📮️ Could not decrypt the signing secret for account #{account_id}: {e}");
                return;
            },
        };
        let timestamp = Utc::now().timestamp().to_string();
        let signature = calculate_hmac_hex(&secret, timestamp.as_bytes());
        let envelope = json!({
            "event": ev.event_type.as_str(),
            "data": ev.event,
            "timestamp": timestamp,
            "signature": signature,
        });
        let order_id = ev.event.order_id.clone();
        let started = Instant::now();
        let outcome = self
            .client
            .post(&url)
            .header("x-api-key", &account.api_key)
            .header("x-signature", &signature)
            .json(&envelope)
            .send()
            .await;
        let duration_ms = started.elapsed().as_millis() as i64;
        let (response_status, response_body, success) = match outcome {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                (Some(i64::from(status.as_u16())), Some(truncate_to(&body, MAX_LOGGED_BODY)), status.is_success())
            },
            Err(e) => (None, Some(truncate_to(&e.to_string(), MAX_LOGGED_BODY)), false),
        };
        if success {
            debug!("📮️ Delivered {} for {order_id} to account #{account_id} in {duration_ms} ms", ev.event_type);
        } else {
            warn!(
                "📮️ Delivery of {} for {order_id} to account #{account_id} failed (status {response_status:?}). The \
                 ledger is unaffected; the attempt has been logged.",
                ev.event_type
            );
        }
        let attempt = NewDeliveryAttempt {
            account_id,
            event_type: ev.event_type.to_string(),
            order_id,
            url,
            request_body: envelope.to_string(),
            response_status,
            response_body,
            duration_ms,
            success,
        };
        if let Err(e) = self.db.record_delivery(attempt).await {
            error!("📮️ Could not record the delivery attempt for account #{account_id}: {e}");
        }
    }
}

fn truncate_to(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_to("short", 1024), "short");
        let long = "é".repeat(600); // 1200 bytes
        let t = truncate_to(&long, MAX_LOGGED_BODY);
        assert!(t.len() <= MAX_LOGGED_BODY);
        assert!(t.chars().all(|c| c == 'é'));
    }
}

//! Middleware tests for the merchant API key + signed timestamp scheme. These run against a
//! real sqlite backend so that the api-key lookup and secret decryption paths are exercised.

use actix_web::{http::StatusCode, test, web, App};
use chrono::{Duration, Utc};
use mpg_common::crypto::{self, EncryptionKey};
use settlement_engine::{
    db_types::{NewMerchantAccount, PaymentFeeConfig, WithdrawalFeeConfig},
    AccountApi,
    SqliteDatabase,
};

use crate::{helpers::calculate_hmac_hex, middleware::ApiKeyMiddlewareFactory, routes::MyBalanceRoute};

const SECRET: &str = "whsec_endpoint_tests";

async fn seed_merchant(db_name: &str) -> (SqliteDatabase, EncryptionKey, String) {
    let _ = env_logger::try_init();
    let url = format!("sqlite://../data/{db_name}.sqlite3?mode=rwc");
    let db = SqliteDatabase::new(&url, 1).await.expect("test database");
    let key = crypto::generate_key();
    let api_key = format!("mk_{:08x}", rand::random::<u32>());
    let account = NewMerchantAccount {
        user_id: format!("merchant-{:08x}", rand::random::<u32>()),
        api_key: api_key.clone(),
        secret_key_enc: crypto::encrypt(&key, SECRET).expect("encrypt secret"),
        webhook_url: None,
        payment_fee: PaymentFeeConfig { use_default: true, ..Default::default() },
        withdrawal_fee: WithdrawalFeeConfig { use_default: true, ..Default::default() },
    };
    AccountApi::new(db.clone()).create_account(account).await.expect("create account");
    (db, key, api_key)
}

/// Makes a `GET /api/balance` request through the auth middleware. Authentication failures come
/// back as `Err` with the middleware's message.
async fn get_balance(
    db: SqliteDatabase,
    key: EncryptionKey,
    headers: &[(&str, String)],
) -> Result<StatusCode, String> {
    let auth = ApiKeyMiddlewareFactory::new(AccountApi::new(db.clone()), key, Duration::seconds(300));
    let app = App::new()
        .app_data(web::Data::new(AccountApi::new(db)))
        .service(web::scope("/api").wrap(auth).service(MyBalanceRoute::<SqliteDatabase>::new()));
    let service = test::init_service(app).await;
    let mut req = test::TestRequest::get().uri("/api/balance");
    for (name, value) in headers {
        req = req.insert_header((*name, value.as_str()));
    }
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => Ok(res.status()),
        Err(e) => Err(e.to_string()),
    }
}

fn auth_headers(api_key: &str, timestamp: i64) -> Vec<(&'static str, String)> {
    let ts = timestamp.to_string();
    let signature = calculate_hmac_hex(SECRET, ts.as_bytes());
    vec![("x-api-key", api_key.to_string()), ("x-timestamp", ts), ("x-signature", signature)]
}

#[actix_web::test]
async fn requests_without_headers_are_rejected() {
    let (db, key, _) = seed_merchant("auth_missing_headers").await;
    let err = get_balance(db, key, &[]).await.expect_err("expected a rejection");
    assert_eq!(err, "Missing x-api-key header.");
}

#[actix_web::test]
async fn stale_timestamps_are_rejected() {
    let (db, key, api_key) = seed_merchant("auth_stale_timestamp").await;
    let stale = (Utc::now() - Duration::seconds(600)).timestamp();
    let err = get_balance(db, key, &auth_headers(&api_key, stale)).await.expect_err("expected a rejection");
    assert_eq!(err, "Timestamp outside the accepted window.");
}

#[actix_web::test]
async fn unknown_api_keys_are_rejected() {
    let (db, key, _) = seed_merchant("auth_unknown_key").await;
    let err = get_balance(db, key, &auth_headers("mk_nobody", Utc::now().timestamp()))
        .await
        .expect_err("expected a rejection");
    assert_eq!(err, "Unknown API key.");
}

#[actix_web::test]
async fn wrong_signatures_are_rejected() {
    let (db, key, api_key) = seed_merchant("auth_bad_signature").await;
    let ts = Utc::now().timestamp().to_string();
    let headers = vec![
        ("x-api-key", api_key),
        ("x-timestamp", ts.clone()),
        ("x-signature", calculate_hmac_hex("not the secret", ts.as_bytes())),
    ];
    let err = get_balance(db, key, &headers).await.expect_err("expected a rejection");
    assert_eq!(err, "Invalid signature.");
}

#[actix_web::test]
async fn valid_credentials_reach_the_handler() {
    let (db, key, api_key) = seed_merchant("auth_happy_path").await;
    let status = get_balance(db, key, &auth_headers(&api_key, Utc::now().timestamp())).await.expect("expected 200");
    assert_eq!(status, StatusCode::OK);
}

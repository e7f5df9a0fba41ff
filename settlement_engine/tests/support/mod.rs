//! Shared harness for the reconciliation integration tests. Each test gets its own SQLite file
//! under `../data/` so they can run in parallel.

use chrono::Duration;
use log::*;
use mpg_common::Money;
use settlement_engine::{
    db_types::{
        MerchantAccount,
        NewMerchantAccount,
        NewVirtualAccountBinding,
        PaymentFeeConfig,
        VirtualAccountBinding,
        WithdrawalFeeConfig,
    },
    events::EventProducers,
    fees::FeeDefaults,
    traits::AccountManagement,
    SettlementApi,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating test database");
    debug!("🚀️ Created test database {url}");
    SqliteDatabase::new(url, 5).await.expect("Error connecting to test database")
}

pub fn settlement_api(db: SqliteDatabase, cooldown_secs: i64) -> SettlementApi<SqliteDatabase> {
    SettlementApi::new(db, EventProducers::default(), FeeDefaults::default(), Duration::seconds(cooldown_secs))
}

/// Creates a merchant with one bound virtual account and the platform-default fee policies.
pub async fn seed_merchant(db: &SqliteDatabase, account_number: &str) -> (MerchantAccount, VirtualAccountBinding) {
    let account = db
        .create_account(NewMerchantAccount {
            user_id: format!("merchant-{account_number}"),
            api_key: format!("mpk_{account_number}"),
            secret_key_enc: "unused-in-engine-tests".to_string(),
            webhook_url: None,
            payment_fee: PaymentFeeConfig { use_default: true, ..Default::default() },
            withdrawal_fee: WithdrawalFeeConfig { use_default: true, ..Default::default() },
        })
        .await
        .expect("Error creating merchant account");
    let binding = db
        .register_binding(NewVirtualAccountBinding {
            account_number: account_number.to_string(),
            account_id: account.id,
            customer_email: "customer@example.com".to_string(),
            customer_name: "Test Customer".to_string(),
            provider_ref: None,
        })
        .await
        .expect("Error binding virtual account");
    (account, binding)
}

/// Test-only shortcut to put funds on an account without running credits through the engine.
pub async fn set_balance(db: &SqliteDatabase, account_id: i64, balance: Money) {
    sqlx::query("UPDATE merchant_accounts SET balance = ? WHERE id = ?")
        .bind(balance)
        .bind(account_id)
        .execute(db.pool())
        .await
        .expect("Error seeding balance");
}

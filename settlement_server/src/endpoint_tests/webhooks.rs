use std::net::SocketAddr;

use actix_web::{http::StatusCode, test, web, App};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Duration;
use mpg_common::Secret;
use rsa::{
    pkcs1v15::SigningKey,
    pkcs8::EncodePublicKey,
    signature::{SignatureEncoding, Signer},
    RsaPrivateKey,
};
use serde_json::{json, Map, Value};
use settlement_engine::{
    db_types::{AccountStatus, EventStatus},
    events::EventProducers,
    fees::{payment_charge, FeeDefaults},
    SettlementApi,
};
use sha1::Sha1;

use super::mocks::{binding, merchant, settled_credit, withdrawal, MockSettlementBackend};
use crate::{
    config::{ProviderConfig, ServerConfig},
    data_objects::JsonResponse,
    routes::{CollectionWebhookRoute, WithdrawalCallbackRoute},
    verify::{canonical_digest, ProviderVerifier},
};

const PEER: &str = "203.0.113.10:44122";

fn keypair() -> (SigningKey<Sha1>, String) {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let public_b64 = BASE64.encode(private.to_public_key().to_public_key_der().unwrap().as_bytes());
    (SigningKey::<Sha1>::new(private), public_b64)
}

fn signed(key: &SigningKey<Sha1>, mut params: Map<String, Value>) -> Value {
    let digest = canonical_digest(&params);
    let sig = key.sign(digest.as_bytes());
    let sign = urlencoding::encode(&BASE64.encode(sig.to_bytes())).into_owned();
    params.insert("sign".to_string(), json!(sign));
    Value::Object(params)
}

fn provider_config(public_key: String) -> ServerConfig {
    ServerConfig {
        provider: ProviderConfig { public_key: Secret::new(public_key), allowlist: None },
        ..Default::default()
    }
}

fn collection(order_no: &str, amount: &str, status: &str) -> Map<String, Value> {
    json!({
        "orderNo": order_no,
        "amount": amount,
        "currency": "NGN",
        "virtualAccountNo": "4400112233",
        "status": status,
        "payerName": "Ada Lovelace",
        "payerAccountNo": "0123456789",
        "payerBankName": "First Bank",
    })
    .as_object()
    .cloned()
    .unwrap()
}

async fn post_webhook(
    config: ServerConfig,
    backend: MockSettlementBackend,
    path: &str,
    body: &Value,
) -> (StatusCode, JsonResponse) {
    let _ = env_logger::try_init();
    let verifier = ProviderVerifier::new(config.provider.public_key.reveal());
    let api =
        SettlementApi::new(backend, EventProducers::default(), config.fees.fee_defaults(), Duration::seconds(300));
    let app = App::new()
        .app_data(web::Data::new(config))
        .app_data(web::Data::new(verifier))
        .app_data(web::Data::new(api))
        .service(
            web::scope("/webhook")
                .service(CollectionWebhookRoute::<MockSettlementBackend>::new())
                .service(WithdrawalCallbackRoute::<MockSettlementBackend>::new()),
        );
    let service = test::init_service(app).await;
    let peer: SocketAddr = PEER.parse().unwrap();
    let req = test::TestRequest::post().uri(path).peer_addr(peer).set_json(body).to_request();
    let res = test::call_service(&service, req).await;
    let status = res.status();
    let ack: JsonResponse = test::read_body_json(res).await;
    (status, ack)
}

#[actix_web::test]
async fn unsigned_webhooks_are_acked_and_dropped() {
    let (_, public_b64) = keypair();
    let backend = MockSettlementBackend::new();
    let body = Value::Object(collection("ord-1", "100.00", "00"));
    let (status, ack) = post_webhook(provider_config(public_b64), backend, "/webhook/collection", &body).await;
    // A bad signature is a business-level rejection: ack with 200 so the provider stops resending.
    assert_eq!(status, StatusCode::OK);
    assert!(!ack.success);
    assert_eq!(ack.message, "invalid signature");
}

#[actix_web::test]
async fn requests_from_unlisted_addresses_are_refused() {
    let (signing, public_b64) = keypair();
    let mut config = provider_config(public_b64);
    config.provider.allowlist = Some(vec!["10.0.0.1".parse().unwrap()]);
    let backend = MockSettlementBackend::new();
    let body = signed(&signing, collection("ord-1", "100.00", "00"));
    let (status, ack) = post_webhook(config, backend, "/webhook/collection", &body).await;
    // Rejections are acknowledged with 200 + an error flag, like any other business-level refusal.
    assert_eq!(status, StatusCode::OK);
    assert!(!ack.success);
    assert_eq!(ack.message, "address not allowed");
}

#[actix_web::test]
async fn valid_collections_are_settled() {
    let (signing, public_b64) = keypair();
    let mut backend = MockSettlementBackend::new();
    backend.expect_fetch_credit_event().returning(|_| Ok(None));
    backend.expect_fetch_binding().returning(|_| Ok(Some(binding(1, "4400112233"))));
    backend.expect_fetch_account().returning(|_| Ok(Some(merchant(1, AccountStatus::Active))));
    backend
        .expect_settle_credit()
        .returning(|credit, account_id, charge| Ok(settled_credit(credit.order_id.as_str(), account_id, charge)));
    let body = signed(&signing, collection("ord-1", "100.00", "00"));
    let (status, ack) = post_webhook(provider_config(public_b64), backend, "/webhook/collection", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack.success);
    assert_eq!(ack.message, "processed");
}

#[actix_web::test]
async fn replayed_collections_are_acknowledged_without_settling() {
    let (signing, public_b64) = keypair();
    let mut backend = MockSettlementBackend::new();
    let prior = settled_credit("ord-1", 1, payment_charge("100.00".parse().unwrap(), None, &FeeDefaults::default()));
    backend.expect_fetch_credit_event().returning(move |_| Ok(Some(prior.clone())));
    // No settle_credit expectation: a replay that touches the ledger fails the test.
    let body = signed(&signing, collection("ord-1", "100.00", "00"));
    let (status, ack) = post_webhook(provider_config(public_b64), backend, "/webhook/collection", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack.success);
    assert_eq!(ack.message, "already processed");
}

#[actix_web::test]
async fn unsuccessful_provider_statuses_are_not_settled() {
    let (signing, public_b64) = keypair();
    let backend = MockSettlementBackend::new();
    let body = signed(&signing, collection("ord-1", "100.00", "05"));
    let (status, ack) = post_webhook(provider_config(public_b64), backend, "/webhook/collection", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!ack.success);
    assert_eq!(ack.message, "event status is not successful");
}

#[actix_web::test]
async fn withdrawal_callbacks_resolve_the_event() {
    let (signing, public_b64) = keypair();
    let mut backend = MockSettlementBackend::new();
    backend
        .expect_finalize_withdrawal()
        .returning(|order_id, _| Ok(withdrawal(order_id.as_str(), 1, EventStatus::Completed)));
    let params = json!({
        "orderNo": "wd-00000000000000aa",
        "status": "SUCCESS",
        "providerRef": "prov-789",
    })
    .as_object()
    .cloned()
    .unwrap();
    let body = signed(&signing, params);
    let (status, ack) = post_webhook(provider_config(public_b64), backend, "/webhook/withdrawal-status", &body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack.success);
    assert_eq!(ack.message, "processed");
}

//! Request handler definitions.
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go
//! into a separate module. Keep this module neat and tidy 🙏
//!
//! Webhook routes acknowledge with `200` + [`JsonResponse`] for every business-level rejection
//! (bad signature, unknown account, replay) so the provider stops redelivering; only a backend
//! failure that is worth a provider retry returns `500`. The merchant API routes return proper
//! status codes via [`ServerError`].

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use log::*;
use serde_json::{json, Map, Value};
use settlement_engine::{
    traits::{AccountManagement, SettlementDatabase, SettlementError},
    AccountApi,
    SettlementApi,
};

use crate::{
    config::ServerConfig,
    data_objects::{
        AuthenticatedMerchant,
        JsonResponse,
        Pagination,
        ProviderCollectionEvent,
        ProviderWithdrawalCallback,
        WithdrawalRequest,
    },
    errors::ServerError,
    helpers::get_remote_ip,
    verify::ProviderVerifier,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
            impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:path),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>); }
        paste::paste! {
            impl<B> [<$name:camel Route>]<B> {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self(core::marker::PhantomData) }
            }
        }
        paste::paste! {
            impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
            where B: $($bounds +)+ 'static
            {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name::<B>);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };
}

route!(health => Get "/health");
route!(collection_webhook => Post "/collection" impl SettlementDatabase, AccountManagement);
route!(withdrawal_callback => Post "/withdrawal-status" impl SettlementDatabase, AccountManagement);
route!(withdraw => Post "/withdraw" impl SettlementDatabase, AccountManagement);
route!(my_balance => Get "/balance" impl AccountManagement, Clone);
route!(my_transactions => Get "/transactions" impl AccountManagement, Clone);
route!(my_deliveries => Get "/deliveries" impl AccountManagement, Clone);

//----------------------------------------------   Health  ----------------------------------------------------

pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

//----------------------------------------   Provider webhooks  -----------------------------------------------

/// Shared front door for the webhook routes: IP allow-list, then the provider signature over
/// the raw payload. Returns the acknowledgement to send when the request must be rejected.
fn verify_webhook(
    req: &HttpRequest,
    config: &ServerConfig,
    verifier: &ProviderVerifier,
    params: &Map<String, Value>,
    sign: &str,
) -> Result<(), HttpResponse> {
    let ip = get_remote_ip(req, config.use_x_forwarded_for, config.use_forwarded);
    if !config.provider.ip_is_allowed(ip) {
        warn!("🔐️ Webhook request from unlisted address {ip:?} refused");
        return Err(HttpResponse::Ok().json(JsonResponse::failure("address not allowed")));
    }
    if !verifier.verify(params, sign) {
        warn!("🔐️ Webhook request failed signature verification");
        return Err(HttpResponse::Ok().json(JsonResponse::failure("invalid signature")));
    }
    Ok(())
}

pub async fn collection_webhook<B>(
    req: HttpRequest,
    config: web::Data<ServerConfig>,
    verifier: web::Data<ProviderVerifier>,
    api: web::Data<SettlementApi<B>>,
    body: web::Json<Map<String, Value>>,
) -> HttpResponse
where
    B: SettlementDatabase + AccountManagement,
{
    let params = body.into_inner();
    let sign = params.get("sign").and_then(Value::as_str).unwrap_or_default().to_string();
    if let Err(ack) = verify_webhook(&req, &config, &verifier, &params, &sign) {
        return ack;
    }
    let event: ProviderCollectionEvent = match serde_json::from_value(Value::Object(params)) {
        Ok(ev) => ev,
        Err(e) => {
            warn!("📬️ Malformed collection payload: {e}");
            return HttpResponse::Ok().json(JsonResponse::failure("malformed payload"));
        },
    };
    if !event.is_successful() {
        info!("📬️ Ignoring collection {} with provider status {}", event.order_no, event.status);
        return HttpResponse::Ok().json(JsonResponse::failure("event status is not successful"));
    }
    let credit = match event.to_new_credit() {
        Ok(c) => c,
        Err(e) => {
            warn!("📬️ Rejecting collection {}: {e}", event.order_no);
            return HttpResponse::Ok().json(JsonResponse::failure("invalid amount"));
        },
    };
    match api.process_credit(credit).await {
        Ok(settlement) => {
            let message = if settlement.already_processed { "already processed" } else { "processed" };
            HttpResponse::Ok().json(JsonResponse::success(message))
        },
        Err(e @ (SettlementError::DatabaseError(_) | SettlementError::OrphanedMutation(_))) => {
            error!("📬️ Backend failure while settling collection: {e}");
            HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR).json(JsonResponse::failure("backend error"))
        },
        Err(e) => {
            info!("📬️ Collection rejected: {e}");
            HttpResponse::Ok().json(JsonResponse::failure(e.to_string()))
        },
    }
}

pub async fn withdrawal_callback<B>(
    req: HttpRequest,
    config: web::Data<ServerConfig>,
    verifier: web::Data<ProviderVerifier>,
    api: web::Data<SettlementApi<B>>,
    body: web::Json<Map<String, Value>>,
) -> HttpResponse
where
    B: SettlementDatabase + AccountManagement,
{
    let params = body.into_inner();
    let sign = params.get("sign").and_then(Value::as_str).unwrap_or_default().to_string();
    if let Err(ack) = verify_webhook(&req, &config, &verifier, &params, &sign) {
        return ack;
    }
    let callback: ProviderWithdrawalCallback = match serde_json::from_value(Value::Object(params)) {
        Ok(cb) => cb,
        Err(e) => {
            warn!("📬️ Malformed withdrawal callback: {e}");
            return HttpResponse::Ok().json(JsonResponse::failure("malformed payload"));
        },
    };
    match api.finalize_withdrawal(&callback.order_id(), callback.resolution()).await {
        Ok(event) => {
            info!("📬️ Withdrawal {} resolved to {}", event.order_id, event.status);
            HttpResponse::Ok().json(JsonResponse::success("processed"))
        },
        Err(e @ (SettlementError::DatabaseError(_) | SettlementError::OrphanedMutation(_))) => {
            error!("📬️ Backend failure while finalizing withdrawal: {e}");
            HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR).json(JsonResponse::failure("backend error"))
        },
        Err(e) => {
            info!("📬️ Withdrawal callback rejected: {e}");
            HttpResponse::Ok().json(JsonResponse::failure(e.to_string()))
        },
    }
}

//----------------------------------------   Merchant API  ----------------------------------------------------

pub async fn withdraw<B>(
    merchant: web::ReqData<AuthenticatedMerchant>,
    api: web::Data<SettlementApi<B>>,
    body: web::Json<WithdrawalRequest>,
) -> Result<HttpResponse, ServerError>
where
    B: SettlementDatabase + AccountManagement,
{
    let request = body.into_inner();
    if request.client_order_id.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("client_order_id must not be empty".to_string()));
    }
    let withdrawal =
        request.to_new_withdrawal(merchant.account_id).map_err(ServerError::InvalidRequestBody)?;
    debug!("🛍️️ Withdrawal request {} from account #{}", withdrawal.client_order_id, merchant.account_id);
    let event = api.process_withdrawal(withdrawal).await?;
    Ok(HttpResponse::Accepted().json(event))
}

pub async fn my_balance<B>(
    merchant: web::ReqData<AuthenticatedMerchant>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: AccountManagement + Clone,
{
    let account = api.account_by_id(merchant.account_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "balance": account.balance.to_string(),
        "currency": mpg_common::SETTLEMENT_CURRENCY_CODE,
        "status": account.status.to_string(),
    })))
}

pub async fn my_transactions<B>(
    merchant: web::ReqData<AuthenticatedMerchant>,
    api: web::Data<AccountApi<B>>,
    query: web::Query<Pagination>,
) -> Result<HttpResponse, ServerError>
where
    B: AccountManagement + Clone,
{
    let events = api.history(merchant.account_id, query.limit, query.offset).await?;
    Ok(HttpResponse::Ok().json(events))
}

pub async fn my_deliveries<B>(
    merchant: web::ReqData<AuthenticatedMerchant>,
    api: web::Data<AccountApi<B>>,
    query: web::Query<Pagination>,
) -> Result<HttpResponse, ServerError>
where
    B: AccountManagement + Clone,
{
    let deliveries = api.deliveries(merchant.account_id, query.limit, query.offset).await?;
    Ok(HttpResponse::Ok().json(deliveries))
}

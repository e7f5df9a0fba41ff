//! Merchant API authentication middleware.
//!
//! Merchant requests carry three headers: `x-api-key` identifies the account, `x-timestamp` is
//! a unix-seconds timestamp within the configured skew window, and `x-signature` is
//! HMAC-SHA256(secret, timestamp) in hex, where the secret is the merchant's webhook signing
//! secret. On success an [`AuthenticatedMerchant`] is attached to the request for handlers.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorInternalServerError, ErrorUnauthorized},
    Error,
    HttpMessage,
};
use chrono::{Duration, Utc};
use futures::future::LocalBoxFuture;
use log::*;
use mpg_common::crypto::{self, EncryptionKey};
use settlement_engine::{AccountApi, SqliteDatabase};

use crate::{data_objects::AuthenticatedMerchant, verify::verify_timestamp_hmac};

pub struct ApiKeyMiddlewareFactory {
    api: AccountApi<SqliteDatabase>,
    encryption_key: EncryptionKey,
    max_skew: Duration,
}

impl ApiKeyMiddlewareFactory {
    pub fn new(api: AccountApi<SqliteDatabase>, encryption_key: EncryptionKey, max_skew: Duration) -> Self {
        Self { api, encryption_key, max_skew }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = ApiKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyMiddlewareService {
            api: self.api.clone(),
            encryption_key: self.encryption_key,
            max_skew: self.max_skew,
            service: Rc::new(service),
        }))
    }
}

pub struct ApiKeyMiddlewareService<S> {
    api: AccountApi<SqliteDatabase>,
    encryption_key: EncryptionKey,
    max_skew: Duration,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let api = self.api.clone();
        let encryption_key = self.encryption_key;
        let max_skew = self.max_skew;
        Box::pin(async move {
            trace!("🔐️ Authenticating merchant API request");
            let api_key = header_value(&req, "x-api-key")?;
            let timestamp = header_value(&req, "x-timestamp")?;
            let signature = header_value(&req, "x-signature")?;
            let ts = timestamp.parse::<i64>().map_err(|_| {
                warn!("🔐️ Rejecting request with a non-numeric x-timestamp");
                ErrorUnauthorized("Invalid timestamp.")
            })?;
            if (Utc::now().timestamp() - ts).abs() > max_skew.num_seconds() {
                warn!("🔐️ Rejecting request with a stale timestamp");
                return Err(ErrorUnauthorized("Timestamp outside the accepted window."));
            }
            let account = api
                .account_by_api_key(&api_key)
                .await
                .map_err(|e| {
                    error!("🔐️ Account lookup failed during authentication: {e}");
                    ErrorInternalServerError("Authentication backend failure.")
                })?
                .ok_or_else(|| {
                    warn!("🔐️ Rejecting request with an unknown API key");
                    ErrorUnauthorized("Unknown API key.")
                })?;
            let secret = crypto::decrypt(&encryption_key, &account.secret_key_enc).map_err(|e| {
                error!("🔐️ Could not decrypt the signing secret for account #{}: {e}", account.id);
                ErrorInternalServerError("Authentication backend failure.")
            })?;
            if !verify_timestamp_hmac(&secret, &timestamp, &signature) {
                warn!("🔐️ Invalid request signature for account #{}", account.id);
                return Err(ErrorUnauthorized("Invalid signature."));
            }
            trace!("🔐️ Merchant #{} authenticated ✅️", account.id);
            req.extensions_mut().insert(AuthenticatedMerchant { account_id: account.id });
            service.call(req).await
        })
    }
}

fn header_value(req: &ServiceRequest, name: &str) -> Result<String, Error> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            warn!("🔐️ Rejecting request with a missing {name} header");
            ErrorUnauthorized(format!("Missing {name} header."))
        })
}

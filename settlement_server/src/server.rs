use std::{future::Future, pin::Pin, sync::Arc, time::Duration as StdDuration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use settlement_engine::{
    events::{EventHandlers, EventHooks},
    AccountApi,
    SettlementApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    middleware::ApiKeyMiddlewareFactory,
    notifier::OutboundNotifier,
    routes::{
        CollectionWebhookRoute,
        HealthRoute,
        MyBalanceRoute,
        MyDeliveriesRoute,
        MyTransactionsRoute,
        WithdrawRoute,
        WithdrawalCallbackRoute,
    },
    verify::ProviderVerifier,
};

const EVENT_BUFFER_SIZE: usize = 100;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db).await?;
    srv.await?;
    Ok(())
}

pub async fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    // Wire the fire-and-continue notification pipeline before the HTTP server starts: the
    // settlement APIs publish into the channel, the notifier consumes it.
    let timeout = config.notifier_timeout.to_std().unwrap_or(StdDuration::from_secs(10));
    let notifier = Arc::new(OutboundNotifier::new(db.clone(), config.encryption_key, timeout)?);
    let mut hooks = EventHooks::default();
    hooks.on_settlement(move |ev| {
        let notifier = Arc::clone(&notifier);
        Box::pin(async move { notifier.handle_event(ev).await }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let settlement_api = web::Data::new(SettlementApi::new(
        db.clone(),
        producers,
        config.fees.fee_defaults(),
        config.retry_cooldown,
    ));
    let accounts_api = web::Data::new(AccountApi::new(db.clone()));
    let host = config.host.clone();
    let port = config.port;
    debug!("💻️ Binding gateway server to {host}:{port}");
    let srv = HttpServer::new(move || {
        let verifier = ProviderVerifier::new(config.provider.public_key.reveal());
        let merchant_auth = ApiKeyMiddlewareFactory::new(
            AccountApi::new(db.clone()),
            config.encryption_key,
            config.auth_max_skew,
        );
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mpg::access_log"))
            .app_data(settlement_api.clone())
            .app_data(accounts_api.clone())
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(verifier))
            .service(HealthRoute::new())
            .service(
                web::scope("/webhook")
                    .service(CollectionWebhookRoute::<SqliteDatabase>::new())
                    .service(WithdrawalCallbackRoute::<SqliteDatabase>::new()),
            )
            .service(
                web::scope("/api")
                    .wrap(merchant_auth)
                    .service(WithdrawRoute::<SqliteDatabase>::new())
                    .service(MyBalanceRoute::<SqliteDatabase>::new())
                    .service(MyTransactionsRoute::<SqliteDatabase>::new())
                    .service(MyDeliveriesRoute::<SqliteDatabase>::new()),
            )
    })
    .keep_alive(KeepAlive::Timeout(StdDuration::from_secs(600)))
    .bind((host, port))?
    .run();
    Ok(srv)
}

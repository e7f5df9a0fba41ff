//! # Merchant payments gateway server
//!
//! The HTTP edge of the gateway. It is responsible for:
//! * Receiving and verifying inbound provider webhooks (collections and withdrawal verdicts)
//!   and handing them to the settlement engine.
//! * The authenticated merchant API: withdrawals, balance, transaction and delivery listings.
//! * Signing and delivering outbound notifications to merchant endpoints, one attempt per
//!   settlement, with a full delivery log.
//!
//! ## Configuration
//! The server is configured via `MPG_*` environment variables. See [config](config/index.html)
//! for more information.
//!
//! ## Routes
//! * `/health`: liveness check, returns 200 OK.
//! * `/webhook/collection`: provider webhook for inbound collections.
//! * `/webhook/withdrawal-status`: provider callback resolving a pending withdrawal.
//! * `/api/withdraw`, `/api/balance`, `/api/transactions`, `/api/deliveries`: merchant API,
//!   authenticated with an API key and a signed timestamp.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod notifier;
pub mod routes;
pub mod server;
pub mod verify;

#[cfg(test)]
mod endpoint_tests;

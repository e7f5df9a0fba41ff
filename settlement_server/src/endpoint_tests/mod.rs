mod auth;
mod mocks;
mod webhooks;

use actix_web::{test, App};

use crate::routes::HealthRoute;

#[actix_web::test]
async fn health_check() {
    let app = test::init_service(App::new().service(HealthRoute::new())).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
}

pub mod health;
pub mod subscriptions;
pub mod wsroute;

use crate::metrics;
use actix_web::{get, web, HttpResponse};

#[get("/")]
pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "controller",
        "status": "running"
    }))
}

/// Every HTTP route the service exposes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(root)
        .service(health::liveness)
        .service(health::readiness)
        .service(subscriptions::list_subscriptions)
        .service(subscriptions::get_subscription)
        .service(subscriptions::create_subscription)
        .service(subscriptions::update_subscription)
        .service(subscriptions::delete_subscription)
        .service(wsroute::measurements_hub)
        .route("/metrics", web::get().to(metrics::serve_metrics));
}

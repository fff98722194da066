use crate::ingest::IngestState;
use crate::state::AppState;
use actix_web::{get, web, HttpResponse};

#[get("/health/live")]
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"alive": true}))
}

/// Ready while the ingest loop is alive. A loop in backoff still counts:
/// it recovers on its own and restarting the pod would not help.
#[get("/health/ready")]
pub async fn readiness(state: web::Data<AppState>) -> HttpResponse {
    let ingest = state.current_ingest_state();
    let subscribers = state.hub.subscriber_count().await;
    let ready = ingest != IngestState::Stopping;

    let body = serde_json::json!({
        "ready": ready,
        "ingest": ingest,
        "subscribers": subscribers,
    });

    if ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

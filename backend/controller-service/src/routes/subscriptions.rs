use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{delete, get, http::header, post, put, web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FilterParams {
    pub filter: Option<String>,
}

impl FilterParams {
    fn required(&self) -> AppResult<&str> {
        self.filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| AppError::BadRequest("filter query parameter is required".into()))
    }
}

#[get("/subscriptions")]
pub async fn list_subscriptions(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.subscriptions.list().await))
}

#[get("/subscriptions/{client_id}")]
pub async fn get_subscription(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let client_id = path.into_inner();
    let pref = state
        .subscriptions
        .get(&client_id)
        .await
        .ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(pref))
}

#[post("/subscriptions/{client_id}")]
pub async fn create_subscription(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<FilterParams>,
) -> AppResult<HttpResponse> {
    let client_id = path.into_inner();
    let filter = query.required()?;

    let pref = state.subscriptions.upsert(&client_id, filter).await;
    tracing::debug!(client_id = %client_id, filter = %filter, "Subscription stored");

    Ok(HttpResponse::Created()
        .insert_header((header::LOCATION, format!("/subscriptions/{client_id}")))
        .json(pref))
}

#[put("/subscriptions/{client_id}")]
pub async fn update_subscription(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<FilterParams>,
) -> AppResult<HttpResponse> {
    let client_id = path.into_inner();
    let filter = query.required()?;

    let pref = state
        .subscriptions
        .update(&client_id, filter)
        .await
        .ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(pref))
}

#[delete("/subscriptions/{client_id}")]
pub async fn delete_subscription(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let client_id = path.into_inner();
    if state.subscriptions.remove(&client_id).await {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_required() {
        let missing = FilterParams { filter: None };
        assert!(matches!(missing.required(), Err(AppError::BadRequest(_))));

        let blank = FilterParams {
            filter: Some("  ".into()),
        };
        assert!(blank.required().is_err());

        let ok = FilterParams {
            filter: Some("sensor:s1".into()),
        };
        assert_eq!(ok.required().unwrap(), "sensor:s1");
    }
}

use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

/// Health check endpoint
///
/// Reports liveness, the identity store backend and the configured providers.
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "store": state.store.backend(),
        "providers": state.providers.names(),
        "timestamp": Utc::now()
    }))
}

use actix_web::{get, HttpResponse, Responder};
use serde_json::json;

use crate::auth::{AuthGate, CurrentIdentity};

/// The authenticated identity, without credentials or tokens.
#[get("/current-user", wrap = "AuthGate")]
pub async fn current_user(identity: CurrentIdentity) -> impl Responder {
    HttpResponse::Ok().json(identity.view())
}

#[get("/profile", wrap = "AuthGate")]
pub async fn profile(identity: CurrentIdentity) -> impl Responder {
    HttpResponse::Ok().json(json!({ "email": identity.email }))
}

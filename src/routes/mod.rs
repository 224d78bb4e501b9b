pub mod auth;
pub mod health;
pub mod oauth;
pub mod profile;

use actix_web::{error::JsonPayloadError, web, HttpRequest};

use crate::error::AppError;

/// Malformed JSON bodies get the same structured 400 as every other client error.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        AppError::BadRequest(err.to_string()).into()
    })
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(health::health)
        .service(
            web::scope("/users")
                .service(auth::register)
                .service(auth::verify_email)
                .service(auth::resend_verification_code)
                .service(auth::login)
                .service(auth::refresh_token)
                .service(profile::current_user)
                .service(profile::profile)
                .service(oauth::start)
                .service(oauth::callback),
        );
}

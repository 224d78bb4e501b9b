use crate::{
    auth::{
        session, verification, AccessTokenResponse, LoginRequest, MessageResponse, RefreshRequest,
        RegisterRequest, ResendVerificationRequest, VerifiedResponse,
    },
    error::AppError,
    state::AppState,
};
use actix_web::{post, web, HttpResponse, Responder};
use chrono::Utc;
use validator::Validate;

/// Register a new user
///
/// Creates an unverified account and mails a verification link. No token is
/// issued until the link is used.
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    verification::register(&state, &register_data).await?;

    Ok(HttpResponse::Created().json(MessageResponse {
        message: "Registration successful! Check your email to verify your account.".into(),
    }))
}

/// Verify an email address
///
/// Consumes the emailed token and answers with an access token.
#[post("/verify-email/{token}")]
pub async fn verify_email(
    state: web::Data<AppState>,
    token: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let identity = verification::complete_verification(&state, &token, Utc::now()).await?;
    let access_token = state.tokens.issue_default_access(identity.id)?;

    Ok(HttpResponse::Ok().json(VerifiedResponse {
        success: true,
        message: "Your email has been successfully verified!".into(),
        token: access_token,
    }))
}

/// Send a fresh verification link, invalidating the previous one.
#[post("/resend-verification-code")]
pub async fn resend_verification_code(
    state: web::Data<AppState>,
    resend_data: web::Json<ResendVerificationRequest>,
) -> Result<impl Responder, AppError> {
    resend_data.validate()?;
    verification::resend_verification(&state, &resend_data.email).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "A new verification email has been sent to your inbox.".into(),
    }))
}

/// Login user
///
/// Authenticates a user and returns an access/refresh token pair. The refresh
/// token replaces any earlier one for the account.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    login_data.validate()?;
    let pair = session::login(&state, &login_data.email, &login_data.password).await?;
    Ok(HttpResponse::Ok().json(pair))
}

/// Trade the current refresh token for a new access token.
#[post("/refresh-token")]
pub async fn refresh_token(
    state: web::Data<AppState>,
    refresh_data: web::Json<RefreshRequest>,
) -> Result<impl Responder, AppError> {
    let presented = refresh_data
        .refresh_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::BadRequest("A refresh token is required.".into()))?;

    let access_token = session::refresh(&state, presented).await?;
    Ok(HttpResponse::Ok().json(AccessTokenResponse { access_token }))
}

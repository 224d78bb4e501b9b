use std::rc::Rc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::auth::audit::AuthEvent;
use crate::auth::extractors::CurrentIdentity;
use crate::auth::token::TokenKind;
use crate::error::AppError;
use crate::models::Identity;
use crate::state::AppState;

/// Per-request authentication gate.
///
/// Requires `Authorization: Bearer <access token>`, verifies the token, loads the
/// identity it names and attaches it to the request as a [`CurrentIdentity`].
/// It establishes who is calling; ownership checks belong to the handlers.
pub struct AuthGate;

impl<S, B> Transform<S, ServiceRequest> for AuthGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthGateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthGateService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthGateService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let state = req
                .app_data::<web::Data<AppState>>()
                .cloned()
                .ok_or_else(|| {
                    AppError::InternalServerError("AppState is not registered".into())
                })?;
            let authorization = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);

            let identity = authenticate(&state, authorization.as_deref()).await?;
            req.extensions_mut().insert(CurrentIdentity(identity));
            service.call(req).await
        })
    }
}

/// Pulls a non-empty token out of a `Bearer <token>` header value.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, AppError> {
    authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::AuthenticationRequired)
}

/// The gate's decision for one `Authorization` header value.
pub async fn authenticate(
    state: &AppState,
    authorization: Option<&str>,
) -> Result<Identity, AppError> {
    let result: Result<Identity, AppError> = async {
        let token = bearer_token(authorization)?;
        let claims = state.tokens.verify_kind(token, TokenKind::Access)?;
        state
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::UnknownTokenSubject)
    }
    .await;

    if let Err(error) = &result {
        let reason = match error {
            AppError::InvalidToken(details) => format!("invalid_token: {}", details),
            other => other.kind().to_string(),
        };
        state.audit.record(AuthEvent::GateRejected { reason });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::audit::RecordingAuditSink;
    use crate::auth::token::{TokenPolicy, TokenService};
    use crate::store::MemoryIdentityStore;
    use actix_web::{test as actix_test, web, App, HttpResponse};
    use chrono::Duration;
    use std::sync::Arc;
    use uuid::Uuid;

    fn state() -> (AppState, Arc<RecordingAuditSink>) {
        let audit = Arc::new(RecordingAuditSink::new());
        let state = AppState::new(
            Arc::new(MemoryIdentityStore::new()),
            TokenService::new("gate-secret", TokenPolicy::default()),
        )
        .with_audit(audit.clone());
        (state, audit)
    }

    async fn stored_identity(state: &AppState) -> Identity {
        state
            .store
            .create(Identity::with_password(
                "gated".into(),
                "gated@example.com".into(),
                "hash".into(),
            ))
            .await
            .unwrap()
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc.def")).unwrap(), "abc.def");
        assert!(matches!(bearer_token(None), Err(AppError::AuthenticationRequired)));
        assert!(matches!(
            bearer_token(Some("Token abc")),
            Err(AppError::AuthenticationRequired)
        ));
        assert!(matches!(
            bearer_token(Some("Bearer ")),
            Err(AppError::AuthenticationRequired)
        ));
        assert!(matches!(
            bearer_token(Some("Bearer    ")),
            Err(AppError::AuthenticationRequired)
        ));
    }

    #[actix_rt::test]
    async fn test_authenticate_accepts_valid_access_token() {
        let (state, _) = state();
        let identity = stored_identity(&state).await;
        let token = state.tokens.issue_default_access(identity.id).unwrap();

        let authenticated = authenticate(&state, Some(&format!("Bearer {}", token)))
            .await
            .unwrap();
        assert_eq!(authenticated.id, identity.id);
    }

    #[actix_rt::test]
    async fn test_authenticate_rejections() {
        let (state, audit) = state();
        let identity = stored_identity(&state).await;

        let expired = state
            .tokens
            .issue_access(identity.id, Duration::minutes(-5))
            .unwrap();
        assert!(matches!(
            authenticate(&state, Some(&format!("Bearer {}", expired))).await,
            Err(AppError::InvalidToken(_))
        ));

        let refresh = state.tokens.issue_pair(identity.id).unwrap().refresh_token;
        assert!(matches!(
            authenticate(&state, Some(&format!("Bearer {}", refresh))).await,
            Err(AppError::InvalidToken(_))
        ));

        let orphan = state.tokens.issue_default_access(Uuid::new_v4()).unwrap();
        assert!(matches!(
            authenticate(&state, Some(&format!("Bearer {}", orphan))).await,
            Err(AppError::UnknownTokenSubject)
        ));

        assert_eq!(audit.events().len(), 3);
    }

    #[actix_rt::test]
    async fn test_gate_attaches_identity() {
        let (state, _) = state();
        let identity = stored_identity(&state).await;
        let token = state.tokens.issue_default_access(identity.id).unwrap();

        let app = actix_test::init_service(
            App::new().app_data(web::Data::new(state)).service(
                web::resource("/whoami")
                    .wrap(AuthGate)
                    .to(|who: CurrentIdentity| async move {
                        HttpResponse::Ok().body(who.email.clone())
                    }),
            ),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/whoami")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(actix_test::read_body(resp).await, "gated@example.com");

        let req = actix_test::TestRequest::get()
            .uri("/whoami")
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_request();
        let err = actix_test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.error_response().status(), 401);
    }
}

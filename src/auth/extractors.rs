use std::future::{ready, Ready};
use std::ops::Deref;

use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Identity;

/// The identity `AuthGate` attached to this request.
///
/// Only usable on routes wrapped by `AuthGate`; anywhere else it fails with
/// `AuthenticationRequired`.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

impl CurrentIdentity {
    pub fn into_inner(self) -> Identity {
        self.0
    }

    /// Whether the caller is the recorded owner of a resource.
    pub fn is_owner_of(&self, owner_id: Uuid) -> bool {
        self.0.id == owner_id
    }

    /// Whether the caller is the supervisor assigned to a resource by email.
    pub fn is_supervisor_for(&self, supervisor_email: &str) -> bool {
        self.0.email.eq_ignore_ascii_case(supervisor_email.trim())
    }
}

impl Deref for CurrentIdentity {
    type Target = Identity;

    fn deref(&self) -> &Identity {
        &self.0
    }
}

impl FromRequest for CurrentIdentity {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<CurrentIdentity>().cloned() {
            Some(identity) => ready(Ok(identity)),
            None => ready(Err(AppError::AuthenticationRequired.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::dev::Payload;
    use actix_web::http::StatusCode;
    use actix_web::test as actix_test;

    fn identity() -> Identity {
        Identity::with_password("owner".into(), "owner@example.com".into(), "hash".into())
    }

    #[actix_rt::test]
    async fn test_current_identity_extractor_success() {
        let owner = identity();
        let req = actix_test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(CurrentIdentity(owner.clone()));

        let mut payload = Payload::None;
        let extracted = CurrentIdentity::from_request(&req, &mut payload)
            .await
            .unwrap();
        assert_eq!(extracted.id, owner.id);
    }

    #[actix_rt::test]
    async fn test_current_identity_extractor_failure() {
        let req = actix_test::TestRequest::default().to_http_request();

        let mut payload = Payload::None;
        let err = CurrentIdentity::from_request(&req, &mut payload)
            .await
            .unwrap_err();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_ownership_helpers() {
        let current = CurrentIdentity(identity());
        assert!(current.is_owner_of(current.id));
        assert!(!current.is_owner_of(Uuid::new_v4()));
        assert!(current.is_supervisor_for("Owner@Example.com"));
        assert!(!current.is_supervisor_for("someone@example.com"));
    }
}

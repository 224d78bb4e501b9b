//! Security events emitted by the identity flows.
//!
//! Flows receive an `AuditSink` through `AppState` instead of logging directly,
//! so tests can observe exactly what was recorded. Reasons that are hidden from
//! clients (unknown vs. expired verification token, stale vs. malformed refresh
//! token) are kept here.

use std::fmt;
use std::sync::Mutex;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationFailure {
    UnknownToken,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailure {
    /// No identity currently holds the presented value.
    NotCurrent,
    /// The stored value matched but failed signature, expiry or kind checks.
    Unverifiable,
    /// The token names a different identity than the one holding it.
    SubjectMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Registered { identity_id: Uuid },
    VerificationIssued { identity_id: Uuid },
    Verified { identity_id: Uuid },
    VerificationRejected { reason: VerificationFailure },
    LoginSucceeded { identity_id: Uuid },
    LoginRejected { email: String },
    LoginConflict { identity_id: Uuid },
    AccessRefreshed { identity_id: Uuid },
    RefreshRejected { reason: RefreshFailure },
    FederatedLogin { provider: String, identity_id: Uuid, created: bool },
    FederationRejected { provider: String, reason: String },
    GateRejected { reason: String },
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthEvent::Registered { identity_id } => {
                write!(f, "event=registered identity_id={}", identity_id)
            }
            AuthEvent::VerificationIssued { identity_id } => {
                write!(f, "event=verification_issued identity_id={}", identity_id)
            }
            AuthEvent::Verified { identity_id } => {
                write!(f, "event=verified identity_id={}", identity_id)
            }
            AuthEvent::VerificationRejected { reason } => {
                write!(f, "event=verification_rejected reason={:?}", reason)
            }
            AuthEvent::LoginSucceeded { identity_id } => {
                write!(f, "event=login identity_id={}", identity_id)
            }
            AuthEvent::LoginRejected { email } => {
                write!(f, "event=login_rejected email={}", mask_email(email))
            }
            AuthEvent::LoginConflict { identity_id } => {
                write!(f, "event=login_conflict identity_id={}", identity_id)
            }
            AuthEvent::AccessRefreshed { identity_id } => {
                write!(f, "event=access_refreshed identity_id={}", identity_id)
            }
            AuthEvent::RefreshRejected { reason } => {
                write!(f, "event=refresh_rejected reason={:?}", reason)
            }
            AuthEvent::FederatedLogin {
                provider,
                identity_id,
                created,
            } => write!(
                f,
                "event=federated_login provider={} identity_id={} created={}",
                provider, identity_id, created
            ),
            AuthEvent::FederationRejected { provider, reason } => write!(
                f,
                "event=federation_rejected provider={} reason={:?}",
                provider, reason
            ),
            AuthEvent::GateRejected { reason } => {
                write!(f, "event=gate_rejected reason={:?}", reason)
            }
        }
    }
}

/// `alice@example.com` becomes `a***@example.com`.
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuthEvent);
}

/// Writes events through the `log` facade under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: AuthEvent) {
        match &event {
            AuthEvent::VerificationRejected { .. }
            | AuthEvent::LoginRejected { .. }
            | AuthEvent::LoginConflict { .. }
            | AuthEvent::RefreshRejected { .. }
            | AuthEvent::FederationRejected { .. }
            | AuthEvent::GateRejected { .. } => log::warn!(target: "audit", "{}", event),
            _ => log::info!(target: "audit", "{}", event),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuthEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuthEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, event: &AuthEvent) -> bool {
        self.events().iter().any(|recorded| recorded == event)
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuthEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingAuditSink::new();
        let id = Uuid::new_v4();
        sink.record(AuthEvent::Registered { identity_id: id });
        sink.record(AuthEvent::Verified { identity_id: id });

        assert_eq!(
            sink.events(),
            vec![
                AuthEvent::Registered { identity_id: id },
                AuthEvent::Verified { identity_id: id }
            ]
        );
    }

    #[test]
    fn test_event_display_is_key_value() {
        let event = AuthEvent::RefreshRejected {
            reason: RefreshFailure::NotCurrent,
        };
        assert_eq!(event.to_string(), "event=refresh_rejected reason=NotCurrent");
    }

    #[test]
    fn test_rejected_login_masks_email() {
        let event = AuthEvent::LoginRejected {
            email: "alice@example.com".into(),
        };
        assert_eq!(
            event.to_string(),
            "event=login_rejected email=a***@example.com"
        );
        assert_eq!(mask_email("not-an-email"), "***");
    }
}

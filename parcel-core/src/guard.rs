//! Route guards — verify a session before a protected view renders
//!
//! `checking → {authorized, unauthorized}`, terminal per mount:
//! - no stored token: unauthorized, no network call
//! - token present, verify fails (any error, or `authenticated: false`):
//!   token and user keys cleared, unauthorized
//! - token present, verify succeeds: authorized after exactly one call
//!
//! Results are never cached; each `check` re-verifies.

use serde_json::Value;

use crate::api::ParcelApi;
use crate::forms::Notice;
use crate::session::SessionScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    /// Nothing stored for the scope.
    NoToken,
    /// The server rejected the stored token.
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardState {
    Checking,
    Authorized {
        user: Option<Value>,
    },
    Unauthorized {
        redirect: &'static str,
        reason: UnauthorizedReason,
    },
}

impl GuardState {
    pub fn is_authorized(&self) -> bool {
        matches!(self, GuardState::Authorized { .. })
    }

    /// "Session expired" notice shown after a rejected token.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            GuardState::Unauthorized {
                reason: UnauthorizedReason::Rejected,
                ..
            } => Some(Notice {
                title: "Session expired".to_string(),
                description: "Please log in again".to_string(),
                variant: crate::forms::NoticeVariant::Destructive,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    api: ParcelApi,
    scope: SessionScope,
}

impl RouteGuard {
    pub fn new(api: ParcelApi, scope: SessionScope) -> Self {
        Self { api, scope }
    }

    pub fn scope(&self) -> SessionScope {
        self.scope
    }

    pub async fn check(&self) -> GuardState {
        let session = self.api.client().sessions().get(self.scope);
        let redirect = self.scope.login_route();

        if !session.is_present() {
            tracing::debug!(scope = self.scope.name(), "Guard: no token");
            return GuardState::Unauthorized {
                redirect,
                reason: UnauthorizedReason::NoToken,
            };
        }

        match self.api.verify(self.scope).await {
            Ok(payload) if payload.authenticated => {
                tracing::debug!(scope = self.scope.name(), "Guard: authorized");
                GuardState::Authorized {
                    user: payload.user.or_else(|| session.user()),
                }
            }
            outcome => {
                match outcome {
                    Err(e) => tracing::warn!(scope = self.scope.name(), error = %e, "Guard: verify failed"),
                    Ok(_) => tracing::warn!(scope = self.scope.name(), "Guard: server reports unauthenticated"),
                }
                if let Err(e) = session.clear() {
                    tracing::error!(scope = self.scope.name(), error = %e, "Failed to clear rejected session");
                }
                GuardState::Unauthorized {
                    redirect,
                    reason: UnauthorizedReason::Rejected,
                }
            }
        }
    }
}

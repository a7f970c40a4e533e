use axum::{extract::FromRequestParts, http::request::Parts};

use bootnet_auth::{Principal, RoleName};
use bootnet_core::UserId;

use crate::app::errors::ApiError;

/// Authenticated caller for a request (identity + current roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn email(&self) -> &str {
        &self.principal.email
    }

    pub fn roles(&self) -> &[RoleName] {
        &self.principal.roles
    }

    pub fn has_role(&self, role: &RoleName) -> bool {
        self.principal.has_role(role)
    }

    /// 403 unless the caller holds `role`.
    pub fn require_role(&self, role: &RoleName) -> Result<(), ApiError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Per-request authentication state, set by the request authenticator.
///
/// Transitions only from `Unauthenticated` to `Authenticated`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestIdentity {
    #[default]
    Unauthenticated,
    Authenticated(PrincipalContext),
}

impl RequestIdentity {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, RequestIdentity::Authenticated(_))
    }

    pub fn principal(&self) -> Option<&PrincipalContext> {
        match self {
            RequestIdentity::Authenticated(p) => Some(p),
            RequestIdentity::Unauthenticated => None,
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for PrincipalContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .and_then(RequestIdentity::principal)
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}

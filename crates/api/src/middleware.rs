//! Request authenticator.
//!
//! Runs once per request and never rejects on its own: it only decides
//! whether the request continues as `Authenticated` or `Unauthenticated`.
//! Handlers that need a caller extract [`PrincipalContext`], which turns an
//! unauthenticated request into a 401.

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::Instrument;

use bootnet_auth::{JwtValidator, Principal};
use bootnet_infra::store::CredentialStore;

use crate::context::{PrincipalContext, RequestIdentity};

/// Path prefix whose requests skip the authenticator entirely.
pub const AUTH_BYPASS_PREFIX: &str = "/api/v1/auth";

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub store: Arc<dyn CredentialStore>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    // Nested routers see a stripped URI; judge by the full path.
    let bypass = match req.extensions().get::<OriginalUri>() {
        Some(original) => is_bypassed(original.path()),
        None => is_bypassed(req.uri().path()),
    };
    if bypass {
        return next.run(req).await;
    }

    let already = req
        .extensions()
        .get::<RequestIdentity>()
        .is_some_and(RequestIdentity::is_authenticated);
    if already {
        return next.run(req).await;
    }

    match resolve(&state, req.headers()).await {
        Some(principal) => {
            let span = tracing::info_span!(
                "request",
                user_id = %principal.user_id(),
                user_email = %principal.email(),
            );
            req.extensions_mut()
                .insert(RequestIdentity::Authenticated(principal));
            next.run(req).instrument(span).await
        }
        None => {
            req.extensions_mut().insert(RequestIdentity::Unauthenticated);
            next.run(req).await
        }
    }
}

fn is_bypassed(path: &str) -> bool {
    path.strip_prefix(AUTH_BYPASS_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

async fn resolve(state: &AuthState, headers: &HeaderMap) -> Option<PrincipalContext> {
    let token = extract_bearer(headers)?;

    let claims = match state.jwt.validate(token, Utc::now()) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, "bearer token rejected");
            return None;
        }
    };

    let user = match state.store.find_user_by_email(&claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::debug!("bearer subject no longer exists");
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not resolve bearer subject");
            return None;
        }
    };

    if user.account_locked {
        tracing::debug!(user_id = %user.id, "bearer subject is locked");
        return None;
    }

    Some(PrincipalContext::new(Principal::from_user(&user)))
}

/// The token after a case-sensitive `"Bearer "` prefix, trimmed.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

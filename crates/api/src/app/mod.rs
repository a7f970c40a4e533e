//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, cache, mail transport and flow construction
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and their validation rules
//! - `errors.rs`: the uniform error shape

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use bootnet_infra::config::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, BootstrapError};

/// Build the full HTTP router over already-wired services.
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        jwt: services.jwt.clone(),
        store: services.store.clone(),
    };

    let api = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/v1", api)
        .layer(ServiceBuilder::new())
}

/// Wire services from `config` and build the router (entrypoint for `main.rs`).
pub async fn build_app_from_config(config: &AppConfig) -> Result<Router, BootstrapError> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(build_app(services))
}

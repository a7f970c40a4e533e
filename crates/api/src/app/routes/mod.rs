use axum::Router;

pub mod auth;
pub mod system;
pub mod users;

/// Router for everything under `/api/v1`.
pub fn router() -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
}

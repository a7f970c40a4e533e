use std::sync::Arc;

use axum::{
    extract::{Extension, Query, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::app::dto::{
    ActivationQuery, AuthenticationRequest, AuthenticationResponse, RegistrationRequest,
};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/authenticate", post(authenticate))
        .route("/activate-account", get(activate_account))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = body?;
    let body = body.normalized();
    body.validate()?;

    services.registration.register(body.into()).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn authenticate(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<AuthenticationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    body.validate()?;

    let token = services.authentication.authenticate(body.into()).await?;
    Ok(Json(AuthenticationResponse { token }).into_response())
}

pub async fn activate_account(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ActivationQuery>, QueryRejection>,
) -> Result<StatusCode, ApiError> {
    let Query(query) = query?;
    let code = query.token.trim();
    if code.is_empty() {
        return Err(ApiError::validation("Activation code is mandatory"));
    }

    services.activation.activate(code).await?;
    Ok(StatusCode::OK)
}

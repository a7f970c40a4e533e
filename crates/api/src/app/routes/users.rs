//! Authenticated user lookups. Every handler requires role `USER`.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::get,
    Json, Router,
};

use bootnet_auth::RoleName;
use bootnet_core::UserId;
use bootnet_infra::accounts::UserView;

use crate::app::dto::CurrentUserResponse;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/email/:email", get(get_by_email))
        .route("/:id", get(get_by_id))
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
) -> Result<Json<CurrentUserResponse>, ApiError> {
    principal.require_role(&RoleName::USER)?;

    let user = services.directory.get_by_id(principal.user_id()).await?;
    Ok(Json(CurrentUserResponse {
        user,
        roles: principal.roles().iter().map(|r| r.as_str().to_string()).collect(),
    }))
}

pub async fn get_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    principal.require_role(&RoleName::USER)?;

    let id: UserId = id
        .parse()
        .map_err(|_| ApiError::validation("User id must be a UUID"))?;
    Ok(Json(services.directory.get_by_id(id).await?))
}

pub async fn get_by_email(
    Extension(services): Extension<Arc<AppServices>>,
    principal: PrincipalContext,
    Path(email): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    principal.require_role(&RoleName::USER)?;

    Ok(Json(services.directory.get_by_email(email.trim()).await?))
}

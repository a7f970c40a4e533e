//! Uniform error responses.
//!
//! Every failure leaves the API in one JSON shape (camelCase, absent fields
//! omitted):
//!
//! ```json
//! { "businessErrorCode": 304, "businessErrorDescription": "...", "error": "...", "validationErrors": ["..."] }
//! ```
//!
//! | ApiError | HTTP | code |
//! |----------|------|------|
//! | `Configuration` | 500 | 500 |
//! | `Validation` | 400 | 400 |
//! | `NotFound` | 404 | 404 |
//! | `InvalidToken` | 404 | 310 |
//! | `ExpiredToken` | 410 | 311 |
//! | `TokenAlreadyUsed` | 400 | 312 |
//! | `AlreadyExists` | 400 | 320 |
//! | `AccountLocked` | 401 | 302 |
//! | `AccountDisabled` | 401 | 303 |
//! | `BadCredentials` | 401 | 304 |
//! | `Unauthenticated` | 401 | 401 |
//! | `Forbidden` | 403 | 403 |
//! | `Internal` | 500 | 0 |

use std::collections::BTreeSet;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use bootnet_auth::AuthFailure;
use bootnet_infra::accounts::AccountError;

/// Stable business error codes exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessErrorCode {
    NoCode,
    AccountLocked,
    AccountDisabled,
    BadCredentials,
    InvalidActivationToken,
    ExpiredActivationToken,
    ActivationTokenAlreadyUsed,
    UserAlreadyExists,
    ValidationFailed,
    AuthenticationRequired,
    AccessDenied,
    ResourceNotFound,
    Misconfiguration,
}

impl BusinessErrorCode {
    pub fn code(self) -> u16 {
        match self {
            Self::NoCode => 0,
            Self::AccountLocked => 302,
            Self::AccountDisabled => 303,
            Self::BadCredentials => 304,
            Self::InvalidActivationToken => 310,
            Self::ExpiredActivationToken => 311,
            Self::ActivationTokenAlreadyUsed => 312,
            Self::UserAlreadyExists => 320,
            Self::ValidationFailed => 400,
            Self::AuthenticationRequired => 401,
            Self::AccessDenied => 403,
            Self::ResourceNotFound => 404,
            Self::Misconfiguration => 500,
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::NoCode | Self::Misconfiguration => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AccountLocked
            | Self::AccountDisabled
            | Self::BadCredentials
            | Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::InvalidActivationToken | Self::ResourceNotFound => StatusCode::NOT_FOUND,
            Self::ExpiredActivationToken => StatusCode::GONE,
            Self::ActivationTokenAlreadyUsed | Self::UserAlreadyExists | Self::ValidationFailed => {
                StatusCode::BAD_REQUEST
            }
            Self::AccessDenied => StatusCode::FORBIDDEN,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::NoCode => "Internal error",
            Self::AccountLocked => "User account is locked",
            Self::AccountDisabled => "User account is disabled",
            Self::BadCredentials => "Login and/or password is incorrect",
            Self::InvalidActivationToken => "Activation code is invalid",
            Self::ExpiredActivationToken => "Activation code has expired, a new code has been sent",
            Self::ActivationTokenAlreadyUsed => "Activation code has already been used",
            Self::UserAlreadyExists => "User already exists",
            Self::ValidationFailed => "Validation failed",
            Self::AuthenticationRequired => "Authentication required",
            Self::AccessDenied => "Access denied",
            Self::ResourceNotFound => "Requested resource was not found",
            Self::Misconfiguration => "Server misconfiguration",
        }
    }
}

/// Boundary error for HTTP handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Configuration,
    Validation(BTreeSet<String>),
    NotFound,
    InvalidToken,
    ExpiredToken,
    TokenAlreadyUsed,
    AlreadyExists,
    AccountLocked,
    AccountDisabled,
    BadCredentials,
    Unauthenticated,
    Forbidden,
    Internal,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(BTreeSet::from([message.into()]))
    }

    pub fn business_code(&self) -> BusinessErrorCode {
        match self {
            ApiError::Configuration => BusinessErrorCode::Misconfiguration,
            ApiError::Validation(_) => BusinessErrorCode::ValidationFailed,
            ApiError::NotFound => BusinessErrorCode::ResourceNotFound,
            ApiError::InvalidToken => BusinessErrorCode::InvalidActivationToken,
            ApiError::ExpiredToken => BusinessErrorCode::ExpiredActivationToken,
            ApiError::TokenAlreadyUsed => BusinessErrorCode::ActivationTokenAlreadyUsed,
            ApiError::AlreadyExists => BusinessErrorCode::UserAlreadyExists,
            ApiError::AccountLocked => BusinessErrorCode::AccountLocked,
            ApiError::AccountDisabled => BusinessErrorCode::AccountDisabled,
            ApiError::BadCredentials => BusinessErrorCode::BadCredentials,
            ApiError::Unauthenticated => BusinessErrorCode::AuthenticationRequired,
            ApiError::Forbidden => BusinessErrorCode::AccessDenied,
            ApiError::Internal => BusinessErrorCode::NoCode,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    business_error_code: u16,
    business_error_description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation_errors: Option<BTreeSet<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.business_code();
        let (error, validation_errors) = match self {
            ApiError::Validation(messages) => (None, Some(messages)),
            ApiError::Internal => (Some("Internal error, contact the administrator".to_string()), None),
            _ => (Some(code.description().to_string()), None),
        };

        let body = ErrorBody {
            business_error_code: code.code(),
            business_error_description: code.description(),
            error,
            validation_errors,
        };
        (code.status(), axum::Json(body)).into_response()
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Configuration(msg) => {
                tracing::error!(error = %msg, "configuration fault");
                ApiError::Configuration
            }
            AccountError::Validation(msg) => ApiError::validation(msg),
            AccountError::NotFound(_) => ApiError::NotFound,
            AccountError::AlreadyExists => ApiError::AlreadyExists,
            AccountError::Auth(AuthFailure::Locked) => ApiError::AccountLocked,
            AccountError::Auth(AuthFailure::Disabled) => ApiError::AccountDisabled,
            AccountError::Auth(AuthFailure::BadCredentials) => ApiError::BadCredentials,
            AccountError::InvalidToken => ApiError::InvalidToken,
            AccountError::TokenAlreadyUsed => ApiError::TokenAlreadyUsed,
            AccountError::ExpiredToken => ApiError::ExpiredToken,
            other @ (AccountError::Password(_)
            | AccountError::Token(_)
            | AccountError::Store(_)
            | AccountError::Task(_)) => {
                tracing::error!(error = %other, "unclassified failure");
                ApiError::Internal
            }
        }
    }
}

/// Field errors collapse to their distinct message texts.
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: BTreeSet<String> = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("invalid value ({})", e.code))
            })
            .collect();

        if messages.is_empty() {
            return ApiError::validation("Validation failed");
        }
        ApiError::Validation(messages)
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootnet_infra::store::StoreError;

    async fn body(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn auth_failures_keep_distinct_codes() {
        let (status, json) = body(AccountError::Auth(AuthFailure::Locked).into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["businessErrorCode"], 302);

        let (_, json) = body(AccountError::Auth(AuthFailure::Disabled).into()).await;
        assert_eq!(json["businessErrorCode"], 303);

        let (_, json) = body(AccountError::Auth(AuthFailure::BadCredentials).into()).await;
        assert_eq!(json["businessErrorCode"], 304);
        assert_eq!(json["businessErrorDescription"], "Login and/or password is incorrect");
    }

    #[tokio::test]
    async fn token_faults_map_to_their_statuses() {
        assert_eq!(body(AccountError::InvalidToken.into()).await.0, StatusCode::NOT_FOUND);
        assert_eq!(body(AccountError::ExpiredToken.into()).await.0, StatusCode::GONE);
        assert_eq!(
            body(AccountError::TokenAlreadyUsed.into()).await.0,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() {
        let err: ApiError = AccountError::Store(StoreError::Backend("pg: password=hunter2".into())).into();
        let (status, json) = body(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["businessErrorCode"], 0);
        assert!(!json.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn validation_messages_are_deduplicated_by_text() {
        let err = ApiError::Validation(BTreeSet::from([
            "must not be blank".to_string(),
            "must not be blank".to_string(),
            "email is not well formatted".to_string(),
        ]));
        let (status, json) = body(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["validationErrors"].as_array().unwrap().len(), 2);
        assert!(json.get("error").is_none());
    }
}

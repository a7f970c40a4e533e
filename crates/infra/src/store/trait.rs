use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use bootnet_auth::{ActivationToken, Role, RoleName, User};
use bootnet_core::{TokenId, UserId};

/// Credential store operation error.
///
/// These are **infrastructure errors** (storage, uniqueness, consistency) as
/// opposed to account-flow outcomes; flows translate them at their boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. duplicate email).
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A record required by a multi-step write was missing.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A concurrent or repeated write lost (e.g. token already stamped).
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// Anything the backend reported that has no finer classification.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence contract for accounts, roles and activation tokens.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - enforce email uniqueness on `save_user` and `register_user`
///   (return `StoreError::Duplicate`)
/// - apply `register_user` atomically: the user and its first token are both
///   stored or neither is
/// - resolve a user's roles eagerly on every user read
/// - apply `complete_activation` atomically: the user-enable and the
///   token-stamp are both visible or neither is
/// - return the most recently issued token when several share a code
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError>;

    async fn save_role(&self, role: Role) -> Result<Role, StoreError>;

    /// Insert or update a user (keyed by id) together with its role set.
    async fn save_user(&self, user: User) -> Result<User, StoreError>;

    /// Insert a brand-new user together with its first activation token.
    ///
    /// `token.user_id` must be `user.id` (`Conflict` otherwise).
    async fn register_user(&self, user: User, token: ActivationToken) -> Result<User, StoreError>;

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn save_token(&self, token: ActivationToken) -> Result<ActivationToken, StoreError>;

    async fn find_token_by_code(&self, code: &str) -> Result<Option<ActivationToken>, StoreError>;

    /// Enable the user and stamp the token's `validated_at` in one unit.
    ///
    /// Fails with `Conflict` if the token was already stamped and with
    /// `NotFound` if either record is missing; nothing is applied then.
    async fn complete_activation(
        &self,
        user_id: UserId,
        token_id: TokenId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn find_role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError> {
        (**self).find_role_by_name(name).await
    }

    async fn save_role(&self, role: Role) -> Result<Role, StoreError> {
        (**self).save_role(role).await
    }

    async fn save_user(&self, user: User) -> Result<User, StoreError> {
        (**self).save_user(user).await
    }

    async fn register_user(&self, user: User, token: ActivationToken) -> Result<User, StoreError> {
        (**self).register_user(user, token).await
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_id(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_email(email).await
    }

    async fn save_token(&self, token: ActivationToken) -> Result<ActivationToken, StoreError> {
        (**self).save_token(token).await
    }

    async fn find_token_by_code(&self, code: &str) -> Result<Option<ActivationToken>, StoreError> {
        (**self).find_token_by_code(code).await
    }

    async fn complete_activation(
        &self,
        user_id: UserId,
        token_id: TokenId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).complete_activation(user_id, token_id, at).await
    }
}

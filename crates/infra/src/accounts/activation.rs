use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use super::{AccountError, ActivationIssuer};
use crate::store::{CredentialStore, StoreError};

/// Consumes activation codes.
pub struct ActivationFlow<S> {
    store: S,
    issuer: Arc<ActivationIssuer<S>>,
}

impl<S> ActivationFlow<S>
where
    S: CredentialStore,
{
    pub fn new(store: S, issuer: Arc<ActivationIssuer<S>>) -> Self {
        Self { store, issuer }
    }

    /// Enable the account owning `code`.
    ///
    /// | token state | outcome |
    /// |-------------|---------|
    /// | unknown | `InvalidToken`, nothing changes |
    /// | already validated | `TokenAlreadyUsed`, nothing changes |
    /// | expired | new token mailed, then `ExpiredToken` |
    /// | pending | user enabled and token stamped together |
    #[instrument(skip(self, code), err)]
    pub async fn activate(&self, code: &str) -> Result<(), AccountError> {
        let now = Utc::now();

        let token = self
            .store
            .find_token_by_code(code)
            .await?
            .ok_or(AccountError::InvalidToken)?;

        if token.is_validated() {
            tracing::warn!(token_id = %token.id, "activation code reused");
            return Err(AccountError::TokenAlreadyUsed);
        }

        let user = self
            .store
            .find_user_by_id(token.user_id)
            .await?
            .ok_or_else(|| AccountError::NotFound(format!("user {}", token.user_id)))?;

        if token.is_expired(now) {
            tracing::warn!(token_id = %token.id, user_id = %user.id, "activation code expired; reissuing");
            self.issuer.issue_activation_token(&user, now).await?;
            return Err(AccountError::ExpiredToken);
        }

        self.store
            .complete_activation(user.id, token.id, now)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AccountError::TokenAlreadyUsed,
                other => AccountError::Store(other),
            })?;

        tracing::info!(user_id = %user.id, "account activated");
        Ok(())
    }
}

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use bootnet_auth::{AuthFailure, TokenIssuer, verify_password};

use super::AccountError;
use crate::store::CredentialStore;

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Exchanges credentials for a signed bearer token. Stateless: nothing is
/// recorded server-side on success.
pub struct AuthenticationFlow<S> {
    store: S,
    issuer: Arc<dyn TokenIssuer>,
}

impl<S> AuthenticationFlow<S>
where
    S: CredentialStore,
{
    pub fn new(store: S, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self { store, issuer }
    }

    /// Account state is checked before the password, so a locked or disabled
    /// account reports that state whether or not the password is right.
    #[instrument(skip(self, credentials), fields(email = %credentials.email), err)]
    pub async fn authenticate(&self, credentials: Credentials) -> Result<String, AccountError> {
        let Some(user) = self.store.find_user_by_email(credentials.email.trim()).await? else {
            tracing::warn!("authentication failed: unknown email");
            return Err(AuthFailure::BadCredentials.into());
        };

        if let Err(failure) = user.ensure_can_authenticate() {
            tracing::warn!(user_id = %user.id, reason = %failure, "authentication refused");
            return Err(failure.into());
        }

        let hash = user.password_hash.clone();
        let password = credentials.password;
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AccountError::Task(e.to_string()))??;
        if !matches {
            tracing::warn!(user_id = %user.id, "authentication failed: bad password");
            return Err(AuthFailure::BadCredentials.into());
        }

        let token = self
            .issuer
            .issue(&user.email, &user.full_name(), &user.role_names(), Utc::now())?;

        tracing::info!(user_id = %user.id, "user authenticated");
        Ok(token)
    }
}

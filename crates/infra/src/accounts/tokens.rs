use chrono::{DateTime, Utc};
use tracing::instrument;

use bootnet_auth::{ActivationCodeGenerator, ActivationPolicy, ActivationToken, User};

use super::AccountError;
use crate::notifications::{ActivationEmail, NotificationDispatcher};
use crate::store::CredentialStore;

/// Upper bound on regenerations when a fresh code collides with a pending one.
const MAX_CODE_ATTEMPTS: usize = 8;

/// Issues activation tokens and queues the matching notification.
///
/// Shared by registration and by the expired-code path of activation.
pub struct ActivationIssuer<S> {
    store: S,
    policy: ActivationPolicy,
    generator: ActivationCodeGenerator,
    activation_url: String,
    dispatcher: NotificationDispatcher,
}

impl<S> ActivationIssuer<S>
where
    S: CredentialStore,
{
    pub fn new(
        store: S,
        policy: ActivationPolicy,
        activation_url: impl Into<String>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            generator: ActivationCodeGenerator::new(policy.code_length),
            policy,
            activation_url: activation_url.into(),
            dispatcher,
        }
    }

    pub fn policy(&self) -> &ActivationPolicy {
        &self.policy
    }

    /// Persist a new token for `user` and dispatch the activation email.
    ///
    /// Delivery is not awaited; a failed send does not undo the token.
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    pub async fn issue_activation_token(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<ActivationToken, AccountError> {
        let token = self.draft_token(user, now).await?;
        let token = self.store.save_token(token).await?;
        self.announce(user, &token);
        Ok(token)
    }

    /// Build an unsaved token for `user` carrying a code no pending token holds.
    pub async fn draft_token(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<ActivationToken, AccountError> {
        let code = self.unique_code(now).await?;
        Ok(ActivationToken::issue(user.id, code, &self.policy, now))
    }

    /// Queue the activation email for a token that is already stored.
    pub fn announce(&self, user: &User, token: &ActivationToken) {
        self.dispatcher.dispatch(ActivationEmail::activate_account(
            user.email.clone(),
            user.full_name(),
            self.activation_url.clone(),
            token.code.clone(),
        ));
        tracing::info!(token_id = %token.id, expires_at = %token.expires_at, "activation token issued");
    }

    /// Draw codes until one is not held by another still-consumable token.
    async fn unique_code(&self, now: DateTime<Utc>) -> Result<String, AccountError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = self.generator.generate();
            match self.store.find_token_by_code(&code).await? {
                Some(existing) if existing.is_consumable(now) => {
                    tracing::debug!("activation code collision; regenerating");
                }
                _ => return Ok(code),
            }
        }
        tracing::error!(
            code_length = self.policy.code_length,
            "could not draw an unused activation code"
        );
        Err(AccountError::Configuration(
            "activation code space exhausted".to_string(),
        ))
    }
}

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use bootnet_auth::{NewUser, RoleName, User, hash_password};

use super::{AccountError, ActivationIssuer};
use crate::store::{CredentialStore, StoreError};

/// Sign-up input. Field-level validation has already happened at the edge.
#[derive(Clone)]
pub struct NewRegistration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for NewRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewRegistration")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Creates disabled accounts and starts email verification.
pub struct RegistrationFlow<S> {
    store: S,
    issuer: Arc<ActivationIssuer<S>>,
}

impl<S> RegistrationFlow<S>
where
    S: CredentialStore,
{
    pub fn new(store: S, issuer: Arc<ActivationIssuer<S>>) -> Self {
        Self { store, issuer }
    }

    /// Register a new account.
    ///
    /// On success exactly one user (disabled, unlocked, role `USER`) and one
    /// activation token exist, and the activation email is queued. On failure
    /// neither record exists, so the same email can register again.
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn register(&self, request: NewRegistration) -> Result<User, AccountError> {
        let now = Utc::now();
        let email = request.email.trim().to_string();

        if self.store.find_user_by_email(&email).await?.is_some() {
            tracing::warn!("registration rejected: email already taken");
            return Err(AccountError::AlreadyExists);
        }

        let role = self
            .store
            .find_role_by_name(&RoleName::USER)
            .await?
            .ok_or_else(|| {
                tracing::error!(role = %RoleName::USER, "default role missing");
                AccountError::Configuration(format!("role {} was not initialized", RoleName::USER))
            })?;

        let password_hash = hash_blocking(request.password).await?;

        let user = User::register(
            NewUser {
                first_name: request.first_name,
                last_name: request.last_name,
                email,
                password_hash,
                roles: vec![role],
            },
            now,
        )?;

        let token = self.issuer.draft_token(&user, now).await?;
        let user = self
            .store
            .register_user(user, token.clone())
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => AccountError::AlreadyExists,
                other => AccountError::Store(other),
            })?;

        self.issuer.announce(&user, &token);

        tracing::info!(user_id = %user.id, "user registered; activation pending");
        Ok(user)
    }
}

async fn hash_blocking(password: String) -> Result<String, AccountError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AccountError::Task(e.to_string()))?
        .map_err(AccountError::from)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use bootnet_auth::{ActivationToken, Role, verify_password};
    use bootnet_core::{TokenId, UserId};
    use chrono::DateTime;

    use super::super::fixtures::{harness, jane};
    use super::*;
    use crate::store::InMemoryCredentialStore;

    #[tokio::test]
    async fn registers_disabled_user_with_default_role() {
        let h = harness().await;
        let user = h.registration.register(jane()).await.unwrap();

        assert_eq!(user.email, "jane@x.com");
        assert!(!user.enabled);
        assert!(!user.account_locked);
        assert_eq!(user.role_names(), vec![RoleName::USER]);
        assert_ne!(user.password_hash, "Secret123!");
        assert!(verify_password("Secret123!", &user.password_hash).unwrap());

        let stored = h.store.find_user_by_email("jane@x.com").await.unwrap();
        assert_eq!(stored, Some(user));
    }

    #[tokio::test]
    async fn issues_a_six_digit_code_and_mails_it() {
        let h = harness().await;
        h.registration.register(jane()).await.unwrap();

        let sent = h.sender.wait_for(1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@x.com");
        assert_eq!(sent[0].subject, "Account activation");
        assert_eq!(sent[0].code.len(), 6);
        assert!(sent[0].code.bytes().all(|b| b.is_ascii_digit()));

        let token = h.store.find_token_by_code(&sent[0].code).await.unwrap().unwrap();
        assert!(token.validated_at.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_without_side_effects() {
        let h = harness().await;
        h.registration.register(jane()).await.unwrap();
        h.sender.wait_for(1).await;

        let err = h.registration.register(jane()).await.unwrap_err();
        assert!(matches!(err, AccountError::AlreadyExists));

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(h.sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn missing_default_role_is_a_configuration_error() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let dispatcher = crate::notifications::NotificationDispatcher::new(Arc::new(
            crate::notifications::testing::RecordingSender::default(),
        ));
        let issuer = Arc::new(ActivationIssuer::new(
            store.clone(),
            bootnet_auth::ActivationPolicy::default(),
            "http://x",
            dispatcher,
        ));
        let flow = RegistrationFlow::new(store.clone(), issuer);

        let err = flow.register(jane()).await.unwrap_err();
        assert!(matches!(err, AccountError::Configuration(_)));
        assert_eq!(store.find_user_by_email("jane@x.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_mail_transport_does_not_fail_registration() {
        let store = Arc::new(InMemoryCredentialStore::new());
        super::super::seed_default_roles(&store).await.unwrap();
        let sender = Arc::new(crate::notifications::testing::RecordingSender::failing());
        let issuer = Arc::new(ActivationIssuer::new(
            store.clone(),
            bootnet_auth::ActivationPolicy::default(),
            "http://x",
            crate::notifications::NotificationDispatcher::new(sender.clone()),
        ));
        let flow = RegistrationFlow::new(store.clone(), issuer);

        let user = flow.register(jane()).await.unwrap();
        sender.wait_for(1).await;
        assert!(store.find_user_by_id(user.id).await.unwrap().is_some());
    }

    /// In-memory store whose token writes fail while `fail` is set.
    struct TokenWritesFail {
        inner: InMemoryCredentialStore,
        fail: AtomicBool,
    }

    impl TokenWritesFail {
        fn check(&self) -> Result<(), StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("transient".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl CredentialStore for TokenWritesFail {
        async fn find_role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError> {
            self.inner.find_role_by_name(name).await
        }

        async fn save_role(&self, role: Role) -> Result<Role, StoreError> {
            self.inner.save_role(role).await
        }

        async fn save_user(&self, user: User) -> Result<User, StoreError> {
            self.inner.save_user(user).await
        }

        async fn register_user(&self, user: User, token: ActivationToken) -> Result<User, StoreError> {
            self.check()?;
            self.inner.register_user(user, token).await
        }

        async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
            self.inner.find_user_by_id(id).await
        }

        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_user_by_email(email).await
        }

        async fn save_token(&self, token: ActivationToken) -> Result<ActivationToken, StoreError> {
            self.check()?;
            self.inner.save_token(token).await
        }

        async fn find_token_by_code(&self, code: &str) -> Result<Option<ActivationToken>, StoreError> {
            self.inner.find_token_by_code(code).await
        }

        async fn complete_activation(
            &self,
            user_id: UserId,
            token_id: TokenId,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.complete_activation(user_id, token_id, at).await
        }
    }

    #[tokio::test]
    async fn failed_token_write_leaves_the_email_free_to_retry() {
        let store = Arc::new(TokenWritesFail {
            inner: InMemoryCredentialStore::new(),
            fail: AtomicBool::new(true),
        });
        super::super::seed_default_roles(&store).await.unwrap();
        let sender = Arc::new(crate::notifications::testing::RecordingSender::default());
        let issuer = Arc::new(ActivationIssuer::new(
            store.clone(),
            bootnet_auth::ActivationPolicy::default(),
            "http://x",
            crate::notifications::NotificationDispatcher::new(sender.clone()),
        ));
        let flow = RegistrationFlow::new(store.clone(), issuer);

        let err = flow.register(jane()).await.unwrap_err();
        assert!(matches!(err, AccountError::Store(StoreError::Backend(_))));
        assert_eq!(store.find_user_by_email("jane@x.com").await.unwrap(), None);

        store.fail.store(false, Ordering::SeqCst);
        let user = flow.register(jane()).await.unwrap();

        let sent = sender.wait_for(1).await;
        assert_eq!(sent.len(), 1);
        let token = store.find_token_by_code(&sent[0].code).await.unwrap().unwrap();
        assert_eq!(token.user_id, user.id);
    }

    #[test]
    fn debug_hides_password() {
        assert!(!format!("{:?}", jane()).contains("Secret123!"));
    }
}

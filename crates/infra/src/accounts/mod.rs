//! Account flows: registration, activation, authentication and lookup.
//!
//! Each flow receives its collaborators explicitly at construction and is
//! generic over the [`CredentialStore`]. Flows contain no HTTP; the API layer
//! maps [`AccountError`] onto status codes.
//!
//! ```text
//! register ──► user (disabled) + activation token ──► notification (spawned)
//! activate ──► token checks ──► complete_activation (atomic)
//!                  └─ expired ──► fresh token + notification, then ExpiredToken
//! authenticate ──► state gate (locked/disabled) ──► password ──► JWT
//! ```

use thiserror::Error;

use bootnet_auth::{AuthFailure, PasswordError, Role, RoleName, TokenError, default_roles};
use bootnet_core::DomainError;

use crate::store::{CredentialStore, StoreError};

pub mod activation;
pub mod authentication;
pub mod directory;
pub mod registration;
pub mod tokens;

pub use activation::ActivationFlow;
pub use authentication::{AuthenticationFlow, Credentials};
pub use directory::{UserDirectory, UserView};
pub use registration::{NewRegistration, RegistrationFlow};
pub use tokens::ActivationIssuer;

/// Outcome taxonomy for account flows.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Server misconfiguration (e.g. default role never seeded).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("user already exists")]
    AlreadyExists,

    #[error(transparent)]
    Auth(#[from] AuthFailure),

    #[error("activation code is invalid")]
    InvalidToken,

    #[error("activation code has already been used")]
    TokenAlreadyUsed,

    /// A replacement code has been issued by the time this is returned.
    #[error("activation code has expired; a new code has been sent")]
    ExpiredToken,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<DomainError> for AccountError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidAccount(msg) | DomainError::InvalidId(msg) => {
                AccountError::Validation(msg)
            }
            DomainError::TokenAlreadyValidated(_) => AccountError::TokenAlreadyUsed,
        }
    }
}

/// Make sure every default role exists. Idempotent; returns the roles.
pub async fn seed_default_roles<S>(store: &S) -> Result<Vec<Role>, AccountError>
where
    S: CredentialStore + ?Sized,
{
    let mut seeded = Vec::new();
    for name in default_roles() {
        seeded.push(ensure_role(store, name).await?);
    }
    Ok(seeded)
}

async fn ensure_role<S>(store: &S, name: RoleName) -> Result<Role, AccountError>
where
    S: CredentialStore + ?Sized,
{
    if let Some(existing) = store.find_role_by_name(&name).await? {
        return Ok(existing);
    }
    match store.save_role(Role::new(name.clone())).await {
        Ok(role) => {
            tracing::info!(role = %role.name, "seeded role");
            Ok(role)
        }
        // Lost a race with another seeder.
        Err(StoreError::Duplicate(_)) => store
            .find_role_by_name(&name)
            .await?
            .ok_or_else(|| AccountError::Configuration(format!("role {name} vanished after insert"))),
        Err(other) => Err(other.into()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use chrono::Duration;

    use bootnet_auth::{ActivationPolicy, Hs256Jwt};

    use super::*;
    use crate::notifications::NotificationDispatcher;
    use crate::notifications::testing::RecordingSender;
    use crate::store::InMemoryCredentialStore;

    pub type Store = Arc<InMemoryCredentialStore>;

    /// Wired flows over an in-memory store with a recording mail transport.
    pub struct Harness {
        pub store: Store,
        pub sender: Arc<RecordingSender>,
        pub issuer: Arc<ActivationIssuer<Store>>,
        pub registration: RegistrationFlow<Store>,
        pub activation: ActivationFlow<Store>,
        pub authentication: AuthenticationFlow<Store>,
        pub directory: UserDirectory<Store>,
    }

    pub async fn harness() -> Harness {
        harness_with(ActivationPolicy::default()).await
    }

    pub async fn harness_with(policy: ActivationPolicy) -> Harness {
        let store: Store = Arc::new(InMemoryCredentialStore::new());
        seed_default_roles(&store).await.unwrap();

        let sender = Arc::new(RecordingSender::default());
        let dispatcher = NotificationDispatcher::new(sender.clone());
        let issuer = Arc::new(ActivationIssuer::new(
            store.clone(),
            policy,
            "http://localhost:4200/activate-account",
            dispatcher,
        ));
        let jwt = Arc::new(Hs256Jwt::new(b"test-secret", Duration::minutes(10)));

        Harness {
            registration: RegistrationFlow::new(store.clone(), issuer.clone()),
            activation: ActivationFlow::new(store.clone(), issuer.clone()),
            authentication: AuthenticationFlow::new(store.clone(), jwt),
            directory: UserDirectory::new(store.clone()),
            store,
            sender,
            issuer,
        }
    }

    pub fn jane() -> NewRegistration {
        NewRegistration {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: "jane@x.com".to_string(),
            password: "Secret123!".to_string(),
        }
    }
}

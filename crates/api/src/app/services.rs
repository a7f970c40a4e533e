//! Service wiring: picks the store and mail transport from config, seeds the
//! default role and constructs the account flows.

use std::sync::Arc;

use thiserror::Error;

use bootnet_auth::Hs256Jwt;
use bootnet_infra::{
    accounts::{
        AccountError, ActivationFlow, ActivationIssuer, AuthenticationFlow, RegistrationFlow,
        UserDirectory, seed_default_roles,
    },
    cache::CachedCredentialStore,
    config::AppConfig,
    notifications::{
        HttpMailRelay, LogNotificationSender, NotificationDispatcher, NotificationError,
        NotificationSender,
    },
    store::{CredentialStore, InMemoryCredentialStore, PostgresCredentialStore, StoreError},
};

/// Type-erased credential store shared by every flow.
pub type SharedStore = Arc<dyn CredentialStore>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("credential store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("role seeding failed: {0}")]
    Seed(#[from] AccountError),

    #[error("mail transport misconfigured: {0}")]
    Notification(#[from] NotificationError),
}

pub struct AppServices {
    /// Cached view of the credential store; everything reads through this.
    pub store: SharedStore,
    pub jwt: Arc<Hs256Jwt>,
    pub registration: RegistrationFlow<SharedStore>,
    pub activation: ActivationFlow<SharedStore>,
    pub authentication: AuthenticationFlow<SharedStore>,
    pub directory: UserDirectory<SharedStore>,
}

/// Wire services from configuration.
///
/// `DATABASE_URL` unset selects the in-memory store; `MAIL_RELAY_URL` unset
/// selects the log transport.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, BootstrapError> {
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            tracing::info!("using postgres credential store");
            Arc::new(PostgresCredentialStore::connect(url).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory credential store");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let sender: Arc<dyn NotificationSender> = match &config.mail_relay_url {
        Some(url) => Arc::new(HttpMailRelay::new(url.clone(), config.mail_from.clone())?),
        None => {
            tracing::info!("MAIL_RELAY_URL not set; activation emails go to the log");
            Arc::new(LogNotificationSender)
        }
    };

    build_services_with(config, store, sender).await
}

/// Wire services over an explicit store and mail transport.
pub async fn build_services_with(
    config: &AppConfig,
    store: SharedStore,
    sender: Arc<dyn NotificationSender>,
) -> Result<AppServices, BootstrapError> {
    let store: SharedStore = Arc::new(CachedCredentialStore::new(store, config.cache_ttl));

    seed_default_roles(&store).await?;

    let jwt = Arc::new(Hs256Jwt::new(
        config.jwt_secret.as_bytes(),
        config.jwt_expiration,
    ));
    let issuer = Arc::new(ActivationIssuer::new(
        store.clone(),
        config.activation,
        config.activation_url.clone(),
        NotificationDispatcher::new(sender),
    ));

    Ok(AppServices {
        registration: RegistrationFlow::new(store.clone(), issuer.clone()),
        activation: ActivationFlow::new(store.clone(), issuer),
        authentication: AuthenticationFlow::new(store.clone(), jwt.clone()),
        directory: UserDirectory::new(store.clone()),
        store,
        jwt,
    })
}

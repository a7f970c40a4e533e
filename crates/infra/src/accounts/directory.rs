use serde::Serialize;

use bootnet_auth::User;
use bootnet_core::UserId;

use super::AccountError;
use crate::store::CredentialStore;

/// Public projection of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Read-only user lookups.
pub struct UserDirectory<S> {
    store: S,
}

impl<S> UserDirectory<S>
where
    S: CredentialStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: UserId) -> Result<UserView, AccountError> {
        self.store
            .find_user_by_id(id)
            .await?
            .map(|u| UserView::from(&u))
            .ok_or_else(|| AccountError::NotFound(format!("user {id}")))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<UserView, AccountError> {
        self.store
            .find_user_by_email(email)
            .await?
            .map(|u| UserView::from(&u))
            .ok_or_else(|| AccountError::NotFound(format!("user {email}")))
    }
}

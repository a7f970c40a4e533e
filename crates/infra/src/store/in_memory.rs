use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use bootnet_auth::{ActivationToken, Role, RoleName, User};
use bootnet_core::{Entity, RoleId, TokenId, UserId};

use super::r#trait::{CredentialStore, StoreError};

fn upsert<E: Entity>(table: &mut HashMap<E::Id, E>, record: E) {
    table.insert(record.id().clone(), record);
}

#[derive(Debug, Default)]
struct Tables {
    roles: HashMap<RoleId, Role>,
    users: HashMap<UserId, User>,
    tokens: HashMap<TokenId, ActivationToken>,
}

/// In-memory credential store.
///
/// Intended for tests/dev. All tables sit behind one lock, which is what makes
/// `complete_activation` atomic here.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    tables: RwLock<Tables>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError> {
        let tables = self.read()?;
        Ok(tables.roles.values().find(|r| &r.name == name).cloned())
    }

    async fn save_role(&self, role: Role) -> Result<Role, StoreError> {
        let mut tables = self.write()?;
        if tables
            .roles
            .values()
            .any(|r| r.name == role.name && r.id != role.id)
        {
            return Err(StoreError::Duplicate(format!("role '{}'", role.name)));
        }
        upsert(&mut tables.roles, role.clone());
        Ok(role)
    }

    async fn save_user(&self, user: User) -> Result<User, StoreError> {
        let mut tables = self.write()?;

        if tables
            .users
            .values()
            .any(|u| u.email == user.email && u.id != user.id)
        {
            return Err(StoreError::Duplicate(format!("email '{}'", user.email)));
        }
        if let Some(missing) = user.roles.iter().find(|r| !tables.roles.contains_key(&r.id)) {
            return Err(StoreError::NotFound(format!("role '{}'", missing.name)));
        }

        upsert(&mut tables.users, user.clone());
        Ok(user)
    }

    async fn register_user(&self, user: User, token: ActivationToken) -> Result<User, StoreError> {
        if token.user_id != user.id {
            return Err(StoreError::Conflict(format!(
                "token {} does not belong to user {}",
                token.id, user.id
            )));
        }

        let mut tables = self.write()?;
        if tables.users.contains_key(&user.id) {
            return Err(StoreError::Duplicate(format!("user {}", user.id)));
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate(format!("email '{}'", user.email)));
        }
        if let Some(missing) = user.roles.iter().find(|r| !tables.roles.contains_key(&r.id)) {
            return Err(StoreError::NotFound(format!("role '{}'", missing.name)));
        }

        upsert(&mut tables.users, user.clone());
        upsert(&mut tables.tokens, token);
        Ok(user)
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let tables = self.read()?;
        Ok(tables.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.read()?;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn save_token(&self, token: ActivationToken) -> Result<ActivationToken, StoreError> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound(format!("user {}", token.user_id)));
        }
        upsert(&mut tables.tokens, token.clone());
        Ok(token)
    }

    async fn find_token_by_code(&self, code: &str) -> Result<Option<ActivationToken>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .tokens
            .values()
            .filter(|t| t.code == code)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn complete_activation(
        &self,
        user_id: UserId,
        token_id: TokenId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let tables = &mut *tables;

        // Validate both sides before touching either.
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        let token = tables
            .tokens
            .get_mut(&token_id)
            .ok_or_else(|| StoreError::NotFound(format!("token {token_id}")))?;
        if token.user_id != user_id {
            return Err(StoreError::Conflict(format!(
                "token {token_id} does not belong to user {user_id}"
            )));
        }

        token
            .mark_validated(at)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        user.enable(at);
        Ok(())
    }
}

//! Postgres-backed credential store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | Email or role name already taken |
//! | Database (foreign key violation) | `23503` | `NotFound` | Token or role link points at a missing row |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! ## Atomic activation
//!
//! `complete_activation` runs in one transaction. The token stamp is a
//! conditional `UPDATE ... WHERE validated_at IS NULL`, so of two concurrent
//! consumers exactly one sees a row affected; the other rolls back with
//! `Conflict`.
//!
//! `register_user` inserts the user, its role links and its first token in
//! one transaction; a failure at any step leaves no row behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use bootnet_auth::{ActivationToken, Role, RoleName, User};
use bootnet_core::{RoleId, TokenId, UserId};

use super::r#trait::{CredentialStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS roles (
    id          UUID PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS users (
    id              UUID PRIMARY KEY,
    first_name      TEXT NOT NULL,
    last_name       TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE,
    password_hash   TEXT NOT NULL,
    account_locked  BOOLEAN NOT NULL DEFAULT FALSE,
    enabled         BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS user_roles (
    user_id     UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role_id     UUID NOT NULL REFERENCES roles(id),
    PRIMARY KEY (user_id, role_id)
);

CREATE TABLE IF NOT EXISTS activation_tokens (
    id              UUID PRIMARY KEY,
    code            TEXT NOT NULL,
    user_id         UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at      TIMESTAMPTZ NOT NULL,
    expires_at      TIMESTAMPTZ NOT NULL,
    validated_at    TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS activation_tokens_code_idx
    ON activation_tokens (code, created_at DESC);
"#;

/// Postgres-backed [`CredentialStore`].
///
/// Uses the SQLx connection pool, which is `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes if they are missing. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn load_roles<'e, E>(executor: E, user_id: UserId) -> Result<Vec<Role>, StoreError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(executor)
        .await
        .map_err(|e| map_sqlx_error("load_roles", e))?;

        rows.iter()
            .map(|row| {
                RoleRow::from_row(row)
                    .map(Role::from)
                    .map_err(|e| StoreError::Backend(format!("failed to decode role row: {e}")))
            })
            .collect()
    }

    async fn hydrate(&self, row: Option<sqlx::postgres::PgRow>) -> Result<Option<User>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let user_row = UserRow::from_row(&row)
            .map_err(|e| StoreError::Backend(format!("failed to decode user row: {e}")))?;
        let roles = Self::load_roles(&*self.pool, UserId::from_uuid(user_row.id)).await?;
        Ok(Some(user_row.into_user(roles)))
    }

    async fn replace_roles(
        tx: &mut Transaction<'_, Postgres>,
        user: &User,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user.id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("replace_roles", e))?;

        for role in &user.roles {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(user.id.as_uuid())
                .bind(role.id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("replace_roles", e))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self), fields(role = %name), err)]
    async fn find_role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM roles WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;

        row.map(|r| {
            RoleRow::from_row(&r)
                .map(Role::from)
                .map_err(|e| StoreError::Backend(format!("failed to decode role row: {e}")))
        })
        .transpose()
    }

    #[instrument(skip(self, role), fields(role = %role.name), err)]
    async fn save_role(&self, role: Role) -> Result<Role, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, name) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.name.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_role", e))?;
        Ok(role)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn save_user(&self, user: User) -> Result<User, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("save_user", e))?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, first_name, last_name, email, password_hash,
                account_locked, enabled, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                password_hash = EXCLUDED.password_hash,
                account_locked = EXCLUDED.account_locked,
                enabled = EXCLUDED.enabled,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.account_locked)
        .bind(user.enabled)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_user", e))?;

        Self::replace_roles(&mut tx, &user).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("save_user", e))?;
        Ok(user)
    }

    #[instrument(skip(self, user, token), fields(user_id = %user.id, token_id = %token.id), err)]
    async fn register_user(&self, user: User, token: ActivationToken) -> Result<User, StoreError> {
        if token.user_id != user.id {
            return Err(StoreError::Conflict(format!(
                "token {} does not belong to user {}",
                token.id, user.id
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("register_user", e))?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, first_name, last_name, email, password_hash,
                account_locked, enabled, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.account_locked)
        .bind(user.enabled)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("register_user", e))?;

        Self::replace_roles(&mut tx, &user).await?;

        sqlx::query(
            r#"
            INSERT INTO activation_tokens (id, code, user_id, created_at, expires_at, validated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id.as_uuid())
        .bind(&token.code)
        .bind(token.user_id.as_uuid())
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.validated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("register_user", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("register_user", e))?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("{USER_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_id", e))?;
        self.hydrate(row).await
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("{USER_COLUMNS} WHERE email = $1"))
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;
        self.hydrate(row).await
    }

    #[instrument(skip(self, token), fields(token_id = %token.id, user_id = %token.user_id), err)]
    async fn save_token(&self, token: ActivationToken) -> Result<ActivationToken, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO activation_tokens (id, code, user_id, created_at, expires_at, validated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET validated_at = EXCLUDED.validated_at
            "#,
        )
        .bind(token.id.as_uuid())
        .bind(&token.code)
        .bind(token.user_id.as_uuid())
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.validated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_token", e))?;
        Ok(token)
    }

    // Codes are never recorded in spans.
    #[instrument(skip(self, code), err)]
    async fn find_token_by_code(&self, code: &str) -> Result<Option<ActivationToken>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, user_id, created_at, expires_at, validated_at
            FROM activation_tokens
            WHERE code = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_token_by_code", e))?;

        row.map(|r| {
            TokenRow::from_row(&r)
                .map(ActivationToken::from)
                .map_err(|e| StoreError::Backend(format!("failed to decode token row: {e}")))
        })
        .transpose()
    }

    #[instrument(skip(self), err)]
    async fn complete_activation(
        &self,
        user_id: UserId,
        token_id: TokenId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("complete_activation", e))?;

        let stamped = sqlx::query(
            r#"
            UPDATE activation_tokens
            SET validated_at = $3
            WHERE id = $1 AND user_id = $2 AND validated_at IS NULL
            "#,
        )
        .bind(token_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("complete_activation", e))?
        .rows_affected();

        if stamped == 0 {
            let exists = sqlx::query("SELECT 1 FROM activation_tokens WHERE id = $1 AND user_id = $2")
                .bind(token_id.as_uuid())
                .bind(user_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("complete_activation", e))?
                .is_some();
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("complete_activation", e))?;
            return Err(unstamped_token_error(token_id, exists));
        }

        let enabled = sqlx::query("UPDATE users SET enabled = TRUE, updated_at = $2 WHERE id = $1")
            .bind(user_id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("complete_activation", e))?
            .rows_affected();

        if enabled == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("complete_activation", e))?;
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("complete_activation", e))?;
        Ok(())
    }
}

const USER_COLUMNS: &str = r#"
    SELECT id, first_name, last_name, email, password_hash,
           account_locked, enabled, created_at, updated_at
    FROM users
"#;

/// Why a conditional token stamp touched no row: the token is either already
/// stamped or not there at all (for this user).
fn unstamped_token_error(token_id: TokenId, exists: bool) -> StoreError {
    if exists {
        StoreError::Conflict(format!("token {token_id} already validated"))
    } else {
        StoreError::NotFound(format!("token {token_id}"))
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────────────────────────

struct RoleRow {
    id: uuid::Uuid,
    name: String,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for RoleRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    }
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: RoleId::from_uuid(row.id),
            name: RoleName::new(row.name),
        }
    }
}

struct UserRow {
    id: uuid::Uuid,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    account_locked: bool,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for UserRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            account_locked: row.try_get("account_locked")?,
            enabled: row.try_get("enabled")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl UserRow {
    fn into_user(self, roles: Vec<Role>) -> User {
        User {
            id: UserId::from_uuid(self.id),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            password_hash: self.password_hash,
            account_locked: self.account_locked,
            enabled: self.enabled,
            roles,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

struct TokenRow {
    id: uuid::Uuid,
    code: String,
    user_id: uuid::Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    validated_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for TokenRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(TokenRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            validated_at: row.try_get("validated_at")?,
        })
    }
}

impl From<TokenRow> for ActivationToken {
    fn from(row: TokenRow) -> Self {
        ActivationToken {
            id: TokenId::from_uuid(row.id),
            code: row.code,
            user_id: UserId::from_uuid(row.user_id),
            created_at: row.created_at,
            expires_at: row.expires_at,
            validated_at: row.validated_at,
        }
    }
}

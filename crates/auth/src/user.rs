//! User account model.
//!
//! A user is created disabled at registration and becomes authenticable once
//! the emailed activation code is consumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bootnet_core::{DomainError, DomainResult, Entity, UserId};

use crate::{Role, RoleName};

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// User account record.
///
/// # Invariants
/// - `email` is globally unique (enforced by the credential store).
/// - A user may authenticate only when `enabled && !account_locked`.
/// - Roles are references to seeded role records, resolved eagerly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub account_locked: bool,
    pub enabled: bool,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for a new (not yet activated) account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<Role>,
}

impl User {
    /// Build a freshly registered account: disabled, unlocked.
    pub fn register(new: NewUser, now: DateTime<Utc>) -> DomainResult<Self> {
        let first_name = new.first_name.trim().to_string();
        let last_name = new.last_name.trim().to_string();
        let email = new.email.trim().to_string();

        if first_name.is_empty() || last_name.is_empty() {
            return Err(DomainError::invalid_account("first and last name are required"));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::invalid_account("email must be a valid address"));
        }
        if new.password_hash.is_empty() {
            return Err(DomainError::invalid_account("password hash is required"));
        }

        Ok(Self {
            id: UserId::new(),
            first_name,
            last_name,
            email,
            password_hash: new.password_hash,
            account_locked: false,
            enabled: false,
            roles: new.roles,
            created_at: now,
            updated_at: None,
        })
    }

    /// Display name used in bearer-token claims and notifications.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn role_names(&self) -> Vec<RoleName> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }

    /// Mark the account as activated (email ownership proven).
    pub fn enable(&mut self, now: DateTime<Utc>) {
        self.enabled = true;
        self.updated_at = Some(now);
    }

    /// Account-state gate checked before any password comparison.
    ///
    /// Locked takes precedence over disabled.
    pub fn ensure_can_authenticate(&self) -> Result<(), AuthFailure> {
        if self.account_locked {
            return Err(AuthFailure::Locked);
        }
        if !self.enabled {
            return Err(AuthFailure::Disabled);
        }
        Ok(())
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication failures
// ─────────────────────────────────────────────────────────────────────────────

/// Distinct credential-check outcomes. Clients branch on which one occurred,
/// so they are never collapsed into a single failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("user account is locked")]
    Locked,

    #[error("user account is disabled")]
    Disabled,

    #[error("bad credentials")]
    BadCredentials,
}

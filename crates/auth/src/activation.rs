//! Activation tokens: short-lived numeric codes proving email ownership.
//!
//! Codes are drawn from the operating system CSPRNG (`OsRng`), never from a
//! seeded generator.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, TryRngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};

use bootnet_core::{DomainError, DomainResult, Entity, TokenId, UserId};

const DIGITS: &[u8; 10] = b"0123456789";

/// Length and lifetime of issued activation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationPolicy {
    pub code_length: usize,
    pub ttl: Duration,
}

impl Default for ActivationPolicy {
    fn default() -> Self {
        Self {
            code_length: 6,
            ttl: Duration::minutes(15),
        }
    }
}

/// Generates uniformly distributed numeric codes.
#[derive(Debug, Clone, Copy)]
pub struct ActivationCodeGenerator {
    length: usize,
}

impl ActivationCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn generate(&self) -> String {
        let mut rng = OsRng.unwrap_err();
        (0..self.length)
            .map(|_| char::from(DIGITS[rng.random_range(0..DIGITS.len())]))
            .collect()
    }
}

/// Persisted activation token.
///
/// Valid for consumption only while `now <= expires_at` and `validated_at`
/// is unset. Stamped exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationToken {
    pub id: TokenId,
    pub code: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl ActivationToken {
    /// Issue a token for `user_id`; expiry is measured from `now`, not from
    /// whenever the notification is eventually delivered.
    pub fn issue(
        user_id: UserId,
        code: String,
        policy: &ActivationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TokenId::new(),
            code,
            user_id,
            created_at: now,
            expires_at: now + policy.ttl,
            validated_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_validated(&self) -> bool {
        self.validated_at.is_some()
    }

    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.is_validated()
    }

    /// Stamp the token as consumed.
    pub fn mark_validated(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_validated() {
            return Err(DomainError::TokenAlreadyValidated(self.id));
        }
        self.validated_at = Some(now);
        Ok(())
    }
}

impl Entity for ActivationToken {
    type Id = TokenId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

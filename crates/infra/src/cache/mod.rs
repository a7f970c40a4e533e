//! Read-through cache for user lookups.
//!
//! Users are cached under both their id and their email. Entries expire after
//! a fixed TTL; any write that touches a user evicts every key it was cached
//! under, so a read after a write never observes the pre-write record.
//!
//! Misses are not cached: a lookup that found nothing is retried against the
//! store next time.
//!
//! Every eviction bumps a generation counter. A read-through fill records the
//! generation before it reads the store and is dropped if an eviction happened
//! in between, so a slow read cannot reinstate a record that a concurrent
//! write already invalidated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use bootnet_auth::{ActivationToken, Role, RoleName, User};
use bootnet_core::{TokenId, UserId};

use crate::store::{CredentialStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Id(UserId),
    Email(String),
}

#[derive(Debug)]
struct Entry {
    user: Arc<User>,
    inserted_at: Instant,
}

/// TTL-bounded user cache keyed by id and by email.
///
/// A poisoned lock degrades to a cache miss; the store stays authoritative.
#[derive(Debug)]
pub struct UserCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, Entry>>,
    // Only bumped while `entries` is write-locked.
    generation: AtomicU64,
}

impl UserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Current eviction generation; pass it to [`UserCache::put_if_current`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn get_by_id(&self, id: UserId) -> Option<Arc<User>> {
        self.get(&CacheKey::Id(id))
    }

    pub fn get_by_email(&self, email: &str) -> Option<Arc<User>> {
        self.get(&CacheKey::Email(email.to_string()))
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<User>> {
        {
            let entries = self.entries.read().ok()?;
            let entry = entries.get(key)?;
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(Arc::clone(&entry.user));
            }
        }

        if let Ok(mut entries) = self.entries.write() {
            if entries
                .get(key)
                .is_some_and(|e| e.inserted_at.elapsed() >= self.ttl)
            {
                entries.remove(key);
            }
        }
        None
    }

    /// Cache `user` under both its id and its email, unless something was
    /// evicted since `generation` was read. Returns whether it was cached.
    pub fn put_if_current(&self, user: &User, generation: u64) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        self.insert(&mut entries, user);
        true
    }

    fn insert(&self, entries: &mut HashMap<CacheKey, Entry>, user: &User) {
        let ttl = self.ttl;
        entries.retain(|_, e| e.inserted_at.elapsed() < ttl);

        let shared = Arc::new(user.clone());
        let now = Instant::now();
        entries.insert(
            CacheKey::Id(user.id),
            Entry {
                user: Arc::clone(&shared),
                inserted_at: now,
            },
        );
        entries.insert(
            CacheKey::Email(user.email.clone()),
            Entry {
                user: shared,
                inserted_at: now,
            },
        );
    }

    /// Drop the id key and every listed email key for a user.
    pub fn evict_user<'a>(&self, id: UserId, emails: impl IntoIterator<Item = &'a str>) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(entry) = entries.remove(&CacheKey::Id(id)) {
            entries.remove(&CacheKey::Email(entry.user.email.clone()));
        }
        for email in emails {
            entries.remove(&CacheKey::Email(email.to_string()));
        }
    }

    pub fn evict_all(&self) {
        if let Ok(mut entries) = self.entries.write() {
            self.generation.fetch_add(1, Ordering::AcqRel);
            entries.clear();
        }
    }

    /// Number of live keys (two per cached user).
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cached store decorator
// ─────────────────────────────────────────────────────────────────────────────

/// [`CredentialStore`] decorator that serves user reads from a [`UserCache`].
///
/// Role and token operations pass straight through.
pub struct CachedCredentialStore<S> {
    inner: S,
    cache: UserCache,
}

impl<S> CachedCredentialStore<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            cache: UserCache::new(ttl),
        }
    }

    pub fn cache(&self) -> &UserCache {
        &self.cache
    }

    /// Administrative full flush.
    pub fn evict_all(&self) {
        self.cache.evict_all();
    }
}

#[async_trait::async_trait]
impl<S> CredentialStore for CachedCredentialStore<S>
where
    S: CredentialStore,
{
    async fn find_role_by_name(&self, name: &RoleName) -> Result<Option<Role>, StoreError> {
        self.inner.find_role_by_name(name).await
    }

    async fn save_role(&self, role: Role) -> Result<Role, StoreError> {
        self.inner.save_role(role).await
    }

    async fn save_user(&self, user: User) -> Result<User, StoreError> {
        let previous_email = self
            .inner
            .find_user_by_id(user.id)
            .await?
            .map(|u| u.email);

        let saved = self.inner.save_user(user).await?;

        let emails = previous_email
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(saved.email.as_str()));
        self.cache.evict_user(saved.id, emails);
        Ok(saved)
    }

    async fn register_user(&self, user: User, token: ActivationToken) -> Result<User, StoreError> {
        let saved = self.inner.register_user(user, token).await?;
        self.cache
            .evict_user(saved.id, std::iter::once(saved.email.as_str()));
        Ok(saved)
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        if let Some(hit) = self.cache.get_by_id(id) {
            return Ok(Some(hit.as_ref().clone()));
        }
        let generation = self.cache.generation();
        let found = self.inner.find_user_by_id(id).await?;
        if let Some(user) = &found {
            self.cache.put_if_current(user, generation);
        }
        Ok(found)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        if let Some(hit) = self.cache.get_by_email(email) {
            return Ok(Some(hit.as_ref().clone()));
        }
        let generation = self.cache.generation();
        let found = self.inner.find_user_by_email(email).await?;
        if let Some(user) = &found {
            self.cache.put_if_current(user, generation);
        }
        Ok(found)
    }

    async fn save_token(&self, token: ActivationToken) -> Result<ActivationToken, StoreError> {
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
        let outcome = self.inner.complete_activation(user_id, token_id, at).await;
        // Evict regardless of outcome.
        self.cache.evict_user(user_id, std::iter::empty());
        outcome
    }
}

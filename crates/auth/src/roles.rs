use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use bootnet_core::{Entity, RoleId};

/// Role name used for authorization decisions and JWT authorities.
///
/// Names are opaque strings at this layer; stores enforce uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(Cow<'static, str>);

impl RoleName {
    /// Role granted to every newly registered account.
    pub const USER: RoleName = RoleName(Cow::Borrowed("USER"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RoleName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted role record. Referenced by users, never owned by them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: RoleName,
}

impl Role {
    pub fn new(name: RoleName) -> Self {
        Self {
            id: RoleId::new(),
            name,
        }
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Roles seeded at process start when absent.
pub fn default_roles() -> Vec<RoleName> {
    vec![RoleName::USER]
}

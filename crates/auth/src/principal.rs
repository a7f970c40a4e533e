use serde::{Deserialize, Serialize};

use bootnet_core::UserId;

use crate::{RoleName, User};

/// A resolved caller identity.
///
/// Roles come from the credential store at resolution time, not from the
/// token, so role changes take effect on the next request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub roles: Vec<RoleName>,
}

impl Principal {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            roles: user.role_names(),
        }
    }

    pub fn has_role(&self, role: &RoleName) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

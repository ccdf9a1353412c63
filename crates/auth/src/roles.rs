use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role name as carried in the token's `roles` claim.
///
/// Only `admin` means anything to the policy; every other name marks an
/// ordinary lab member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity providers disagree on casing, so `Admin` counts too.
    pub fn is_admin(&self) -> bool {
        self.0.trim().eq_ignore_ascii_case(Self::ADMIN.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_match_ignores_case() {
        assert!(Role::new("Admin").is_admin());
        assert!(Role::ADMIN.is_admin());
        assert!(!Role::new("lab-manager").is_admin());
    }
}

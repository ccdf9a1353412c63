//! Role → permission mapping.

use crate::{Permission, Role};

/// Permissions every authenticated lab member holds.
const MEMBER_PERMISSIONS: &[Permission] = &[
    Permission::ITEMS_READ,
    Permission::USAGE_SUBMIT,
    Permission::USAGE_READ,
    Permission::ORDERS_CREATE,
    Permission::ORDERS_READ,
    Permission::REORDER_READ,
];

/// Resolve the effective permissions for a set of roles.
///
/// `admin` grants the wildcard. Any other authenticated principal gets the
/// member set: read, submit usage, raise orders. Deciding and finalizing
/// stay admin-only.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(Role::is_admin) {
        return vec![Permission::WILDCARD];
    }

    MEMBER_PERMISSIONS.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_gets_wildcard() {
        let perms = permissions_for_roles(&[Role::new("technician"), Role::ADMIN]);
        assert_eq!(perms, vec![Permission::WILDCARD]);
    }

    #[test]
    fn member_cannot_decide_or_finalize() {
        let perms = permissions_for_roles(&[Role::new("technician")]);
        assert!(perms.contains(&Permission::USAGE_SUBMIT));
        assert!(!perms.contains(&Permission::USAGE_DECIDE));
        assert!(!perms.contains(&Permission::ORDERS_FINALIZE));
        assert!(!perms.contains(&Permission::ITEMS_WRITE));
    }
}

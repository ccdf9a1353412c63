use thiserror::Error;
use tracing::debug;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: resource belongs to another user")]
    NotOwner,
}

/// Command-side authorization contract, checked before a workflow runs.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal for a single permission.
///
/// No IO and no panics: a pure policy check.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.has_permission(required) {
        Ok(())
    } else {
        debug!(user_id = %principal.user_id, permission = required.as_str(), "permission denied");
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Authorize every permission a command requires.
pub fn authorize_all<C>(principal: &Principal, command: &C) -> Result<(), AuthzError>
where
    C: CommandAuthorization + ?Sized,
{
    for perm in command.required_permissions() {
        authorize(principal, perm)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use labstock_core::UserId;

    use super::*;
    use crate::Role;

    struct Decide;

    impl CommandAuthorization for Decide {
        fn required_permissions(&self) -> &[Permission] {
            &[Permission::USAGE_DECIDE]
        }
    }

    #[test]
    fn admin_passes_any_permission() {
        let admin = Principal::from_roles(UserId::new(), vec![Role::ADMIN]);
        assert!(authorize_all(&admin, &Decide).is_ok());
        assert!(authorize(&admin, &Permission::new("anything.at.all")).is_ok());
    }

    #[test]
    fn member_is_forbidden_from_deciding() {
        let member = Principal::from_roles(UserId::new(), vec![Role::new("technician")]);
        let err = authorize_all(&member, &Decide).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("stock.usage.decide".to_string()));
    }

    #[test]
    fn owners_and_admins_can_view() {
        let owner = UserId::new();
        let member = Principal::from_roles(owner, vec![Role::new("technician")]);
        let other = Principal::from_roles(UserId::new(), vec![Role::new("technician")]);
        let admin = Principal::from_roles(UserId::new(), vec![Role::ADMIN]);

        assert!(member.can_view(owner));
        assert!(!other.can_view(owner));
        assert!(admin.can_view(owner));
    }
}

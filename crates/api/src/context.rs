use labstock_auth::{JwtClaims, Principal, Role};
use labstock_core::UserId;

/// Authenticated caller of a request, inserted by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn from_claims(claims: JwtClaims) -> Self {
        Self {
            principal: Principal::from_roles(claims.sub, claims.roles),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.roles
    }
}

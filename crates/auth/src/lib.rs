//! `labstock-auth`: pure authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage. Identity and role resolution happen
//! upstream; this crate only verifies tokens and checks permissions.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, authorize, authorize_all};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use policy::permissions_for_roles;
pub use principal::Principal;
pub use roles::Role;

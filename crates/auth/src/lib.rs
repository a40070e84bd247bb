//! `bizdesk-auth`: authentication and authorization boundary.
//!
//! Decoupled from HTTP and storage: the API crate extracts the bearer token,
//! this crate verifies it and answers "may this principal do X in this tenant".

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use policy::RolePolicy;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::Role;

//! Authentication: password hashing, session tokens and the request guards.

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;

pub use jwt::{IssuedToken, JwtService, SessionClaims};
pub use middleware::{auth_middleware, require_admin, AuthState};
pub use models::AuthUser;

pub mod auth;
pub mod rate_limit;

pub use auth::{maybe_user, protect, restrict_to, CurrentUser, RoleSet};
pub use rate_limit::{rate_limit, RateLimiter};

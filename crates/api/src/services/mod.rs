//! Application services used by the route handlers.

pub mod auth;
pub mod bootstrap;
pub mod email;

pub use auth::{AuthError, AuthService};
pub use email::EmailService;

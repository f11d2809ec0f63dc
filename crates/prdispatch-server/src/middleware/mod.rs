//! Request middleware.

pub mod login;

pub use login::{AuthenticatedUser, SESSION_COOKIE, require_login, session_cookie};

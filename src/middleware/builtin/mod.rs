//! Built-in middleware
//!
//! [`SessionMiddleware`] is installed globally when sessions are enabled in
//! configuration. CSRF protection lives in [`crate::security::csrf`].

pub mod session;

pub use session::SessionMiddleware;

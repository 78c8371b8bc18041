//! Squehub - a small MVC web framework core
//!
//! Squehub provides:
//! - Blade-style templates compiled to a cached instruction tree
//! - Layouts with `@extends`, `@section` and `@yield`
//! - A regex router with groups, named routes and controller actions
//! - Gatekeeper middleware with inbound and outbound phases
//! - Sessions, flash notifications and CSRF protection

#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routing;
pub mod security;
pub mod session;
pub mod views;

pub use app::Squehub;
pub use config::AppConfig;
pub use context::Context;
pub use error::{Error, Result};
pub use http::{Request, Response, StatusCode};
pub use middleware::{
    InboundAction, InboundMiddleware, MiddlewareRef, MiddlewareRegistry, MiddlewareResult,
    OutboundMiddleware,
};
pub use routing::{
    Controller, ControllerRegistry, GroupAttributes, Handler, Route, RouteHandler, Router,
};
pub use security::{CsrfConfig, CsrfMiddleware, HtmlEscaper};
pub use session::{Session, SessionStorage, SessionStore};
pub use views::ViewEngine;

pub use serde::{Deserialize, Serialize};
pub use serde_json::{json, Value};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::*;
    pub use async_trait::async_trait;
    pub use futures::future::BoxFuture;
    pub use serde_json::json;
    pub use std::collections::HashMap;

    pub use crate::middleware::{DualPhaseMiddleware, FnMiddleware};
    pub use crate::routes;
}

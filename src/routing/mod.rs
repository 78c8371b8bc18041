//! Routing
//!
//! Routes map an HTTP method and a path pattern such as `/users/{id}` to a
//! handler. Patterns are normalized to `/segment/segment` form, `{name}`
//! placeholders match one non-empty path segment, and captures are passed to
//! the handler positionally through [`Context::param`].
//!
//! ```rust,ignore
//! router.add(Route::get("/", |ctx| Box::pin(home(ctx))).name("home"))?;
//! router.group(GroupAttributes::new().prefix("/admin").middleware("auth"), |admin| {
//!     admin.add(Route::action(&["GET"], "/users/{id}", "Admin/Users#show"))
//! })?;
//! ```

pub mod controller;
pub mod group;
pub mod router;

pub use controller::{Controller, ControllerRegistry};
pub use group::{GroupAttributes, RouteGroup};
pub use router::{NamedRoutes, RouteInfo, RouteMatch, Router};

use crate::context::Context;
use crate::error::Result;
use crate::middleware::MiddlewareRef;
use futures::future::BoxFuture;

/// Route handler: fills in the response on the context
pub type RouteHandler = for<'a> fn(&'a mut Context) -> BoxFuture<'a, Result<()>>;

/// What a route runs once its middleware let the request through
#[derive(Clone)]
pub enum Handler {
    Function(RouteHandler),
    /// `Controller#action` (or `Controller@action`), resolved at dispatch time
    Action(String),
}

impl Handler {
    pub fn describe(&self) -> String {
        match self {
            Handler::Function(_) => "<fn>".to_string(),
            Handler::Action(descriptor) => descriptor.clone(),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler({})", self.describe())
    }
}

/// Route definition passed to [`Router::add`]
#[derive(Debug, Clone)]
pub struct Route {
    pub methods: Vec<String>,
    pub pattern: String,
    pub handler: Handler,
    pub name: Option<String>,
    pub middleware: Vec<MiddlewareRef>,
}

impl Route {
    pub fn new(methods: &[&str], pattern: &str, handler: Handler) -> Self {
        Self {
            methods: methods.iter().map(|m| m.to_uppercase()).collect(),
            pattern: pattern.to_string(),
            handler,
            name: None,
            middleware: Vec::new(),
        }
    }

    pub fn get(pattern: &str, handler: RouteHandler) -> Self {
        Self::new(&["GET"], pattern, Handler::Function(handler))
    }

    pub fn post(pattern: &str, handler: RouteHandler) -> Self {
        Self::new(&["POST"], pattern, Handler::Function(handler))
    }

    pub fn put(pattern: &str, handler: RouteHandler) -> Self {
        Self::new(&["PUT"], pattern, Handler::Function(handler))
    }

    pub fn patch(pattern: &str, handler: RouteHandler) -> Self {
        Self::new(&["PATCH"], pattern, Handler::Function(handler))
    }

    pub fn delete(pattern: &str, handler: RouteHandler) -> Self {
        Self::new(&["DELETE"], pattern, Handler::Function(handler))
    }

    /// Controller action route, e.g. `Route::action(&["GET", "POST"], "/login", "Auth#login")`
    pub fn action(methods: &[&str], pattern: &str, descriptor: &str) -> Self {
        Self::new(methods, pattern, Handler::Action(descriptor.to_string()))
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Append a middleware; runs after those added before it
    pub fn middleware(mut self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.middleware.push(middleware.into());
        self
    }
}

/// Build a list of function routes
///
/// ```rust,ignore
/// let routes = routes![
///     GET "/" => home::index,
///     POST "/contact" => home::contact,
/// ];
/// ```
#[macro_export]
macro_rules! routes {
    ($($method:ident $path:literal => $handler:expr),* $(,)?) => {
        vec![
            $(
                $crate::routing::Route::new(
                    &[stringify!($method)],
                    $path,
                    $crate::routing::Handler::Function($handler),
                )
            ),*
        ]
    };
}

/// Normalize a path: strip the query string, trim slashes, prefix one `/`
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    format!("/{}", path.trim_matches('/'))
}

use crate::config::AppConfig;
use crate::context::Context;
use crate::error::{Error, ErrorPages, Result};
use crate::http::{Request, Response, Server};
use crate::middleware::builtin::SessionMiddleware;
use crate::middleware::{run_inbound, run_outbound, MiddlewareInstance, MiddlewareRegistry, MiddlewareResult};
use crate::routing::{ControllerRegistry, RouteHandler, Router};
use crate::security::{CsrfConfig, CsrfMiddleware};
use crate::session::SessionStore;
use crate::views::ViewEngine;
use hyper::Body;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Squehub application
///
/// Owns the router, the view engine and the global middleware. Everything a
/// request touches is shared immutably, so one instance serves all
/// connections.
///
/// ```rust,ignore
/// let app = Squehub::from_file("config.toml")?
///     .middleware_from(|registry| registry.register_inbound("auth", AuthMiddleware))
///     .controllers(|registry| registry.register(users::controller()))
///     .routes(|router| {
///         router.add(Route::get("/", home).name("home"))?;
///         router.add(Route::action(&["GET"], "/users/{id}", "Users#show").middleware("auth"))
///     })?;
/// app.serve().await
/// ```
pub struct Squehub {
    router: Router,
    views: Arc<ViewEngine>,
    global: MiddlewareRegistry,
    sessions: Option<SessionStore>,
    error_pages: ErrorPages,
    pub config: Arc<AppConfig>,
}

impl Default for Squehub {
    fn default() -> Self {
        Self::new()
    }
}

impl Squehub {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// Build the application; session and CSRF middleware follow the configuration
    pub fn with_config(config: AppConfig) -> Self {
        let views = Arc::new(ViewEngine::with_config(&config.views));
        let error_pages = ErrorPages::new(Arc::clone(&views), !config.environment.is_production());

        let mut global = MiddlewareRegistry::new();
        let sessions = if config.session.enabled {
            let store = SessionStore::new(config.session.clone());
            global.register_dual("session", SessionMiddleware::with_store(store.clone()));
            Some(store)
        } else {
            None
        };

        if config.csrf.enabled {
            if sessions.is_some() {
                global.register_inbound("csrf", CsrfMiddleware::with_config(CsrfConfig::from(&config.csrf)));
            } else {
                log::warn!("CSRF protection requires sessions; it stays disabled");
            }
        }

        log::debug!(
            "Global middleware: {:?}",
            global.get_sorted().iter().map(|m| m.name.as_str()).collect::<Vec<_>>()
        );

        Self {
            router: Router::new(),
            views,
            global,
            sessions,
            error_pages,
            config: Arc::new(config),
        }
    }

    #[cfg(feature = "config")]
    pub fn from_file(config_path: &str) -> Result<Self> {
        let config = AppConfig::from_file(config_path)?;
        config.validate()?;
        Ok(Self::with_config(config))
    }

    pub fn from_env() -> Result<Self> {
        let config = AppConfig::from_env()?;
        Ok(Self::with_config(config))
    }

    /// Register named middleware that routes can reference
    ///
    /// Call before [`Squehub::routes`]: names are resolved when routes are added.
    pub fn middleware_from<F>(mut self, register_fn: F) -> Self
    where
        F: FnOnce(&mut MiddlewareRegistry),
    {
        register_fn(self.router.middleware_mut());
        self
    }

    /// Register middleware that runs for every request, ordered by priority
    pub fn global<F>(mut self, register_fn: F) -> Self
    where
        F: FnOnce(&mut MiddlewareRegistry),
    {
        register_fn(&mut self.global);
        self
    }

    pub fn controllers<F>(mut self, register_fn: F) -> Self
    where
        F: FnOnce(&mut ControllerRegistry),
    {
        register_fn(self.router.controllers_mut());
        self
    }

    pub fn routes<F>(mut self, register_fn: F) -> Result<Self>
    where
        F: FnOnce(&mut Router) -> Result<()>,
    {
        register_fn(&mut self.router)?;
        log::debug!("{} route(s) registered", self.router.route_count());
        Ok(self)
    }

    /// Handler for requests no route matches
    pub fn not_found(mut self, handler: RouteHandler) -> Self {
        self.router.set_not_found(handler);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn views(&self) -> &Arc<ViewEngine> {
        &self.views
    }

    pub fn session_store(&self) -> Option<&SessionStore> {
        self.sessions.as_ref()
    }

    /// Serve on the configured address until SIGINT or SIGTERM
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.server_address();
        self.serve_on(&addr).await
    }

    pub async fn serve_on(self, addr: &str) -> Result<()> {
        log::info!(
            "Starting Squehub ({} environment, {} routes, view cache {})",
            self.config.environment.as_str(),
            self.router.route_count(),
            if self.config.views.cache_enabled { "on" } else { "off" }
        );

        if let Some(store) = self.sessions.clone() {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
                loop {
                    interval.tick().await;
                    if let Err(e) = store.cleanup_expired().await {
                        log::warn!("Session cleanup failed: {}", e);
                    }
                }
            });
        }

        Server::new(self).serve(addr).await
    }

    pub async fn handle_request(&self, req: hyper::Request<Body>) -> Result<Response> {
        let request = Request::from_hyper(req).await?;
        Ok(self.dispatch(request).await)
    }

    /// Run one request through global middleware, the router and back
    ///
    /// Errors never escape: they are logged and turned into error pages.
    pub async fn dispatch(&self, request: Request) -> Response {
        let started = Instant::now();
        let method = request.method.clone();
        let path = request.path().to_string();

        let mut ctx = Context::new(request, Arc::clone(&self.views), self.router.named_routes());
        let global = self.global.get_sorted();
        let mut outbound = Vec::new();

        let response = match self.process(&global, &mut ctx, &mut outbound).await {
            Ok(response) => response,
            Err(e) => self.error_response(&ctx, &e),
        };
        ctx.set_response(response);

        if let Err(e) = run_outbound(&outbound, &mut ctx).await {
            let page = self.error_response(&ctx, &e);
            ctx.set_response(page);
        }

        let response = ctx.take_response().unwrap_or_else(Response::internal_error);
        log::info!(
            "{} {} {} {}ms [{}]",
            method,
            path,
            response.status.as_u16(),
            started.elapsed().as_millis(),
            ctx.request_id()
        );
        response
    }

    async fn process<'m>(
        &self,
        global: &'m [Arc<MiddlewareInstance>],
        ctx: &mut Context,
        outbound: &mut Vec<&'m MiddlewareInstance>,
    ) -> Result<Response> {
        if run_inbound(global, ctx, outbound).await? == MiddlewareResult::Stop {
            return Ok(ctx.take_response().unwrap_or_else(Response::internal_error));
        }
        self.router.dispatch(ctx).await
    }

    fn error_response(&self, ctx: &Context, error: &Error) -> Response {
        let status = error.status_code();
        if status >= 500 {
            log::error!(
                "[{}] {} {} failed: {}",
                ctx.request_id(),
                ctx.req.method,
                ctx.path(),
                error
            );
        } else {
            log::warn!(
                "[{}] {} {} rejected: {}",
                ctx.request_id(),
                ctx.req.method,
                ctx.path(),
                error
            );
        }
        self.error_pages.render_error_page(status, Some(error))
    }
}

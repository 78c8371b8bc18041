use super::controller::ControllerRegistry;
use super::group::{join_path, GroupAttributes, RouteGroup};
use super::{normalize_path, Handler, Route, RouteHandler};
use crate::context::Context;
use crate::error::pages::not_found_response;
use crate::error::{Error, Result};
use crate::http::Response;
use crate::middleware::{run_inbound, run_outbound, MiddlewareInstance, MiddlewareRegistry, MiddlewareResult};
use crate::views::value::to_display;
use hyper::StatusCode;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// `{name}` placeholders in route patterns
static PARAM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([a-zA-Z0-9_]+)\}").expect("Router: invalid route parameter regex")
});

/// Route name → normalized pattern, for reverse routing
#[derive(Debug, Clone, Default)]
pub struct NamedRoutes {
    routes: IndexMap<String, String>,
}

impl NamedRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, pattern: &str) {
        self.routes.insert(name.to_string(), pattern.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(String::as_str)
    }

    /// Substitute `{key}` placeholders; unknown names produce `#`
    ///
    /// Placeholders without a matching parameter are left as they are.
    pub fn url(&self, name: &str, params: &Map<String, Value>) -> String {
        let pattern = match self.routes.get(name) {
            Some(pattern) => pattern,
            None => {
                log::debug!("No route named '{}'", name);
                return "#".to_string();
            }
        };

        params.iter().fold(pattern.clone(), |url, (key, value)| {
            url.replace(&format!("{{{}}}", key), &to_display(value))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A registered route with its middleware already resolved
pub(crate) struct RouteEntry {
    pattern: String,
    regex: Regex,
    param_names: Vec<String>,
    handler: Handler,
    name: Option<String>,
    middleware: Vec<Arc<MiddlewareInstance>>,
}

/// A successful lookup
pub struct RouteMatch<'a> {
    entry: &'a RouteEntry,
    /// Captured segments in pattern order
    pub params: Vec<String>,
}

impl<'a> RouteMatch<'a> {
    pub fn pattern(&self) -> &'a str {
        &self.entry.pattern
    }

    pub fn name(&self) -> Option<&'a str> {
        self.entry.name.as_deref()
    }

    pub fn param_names(&self) -> &'a [String] {
        &self.entry.param_names
    }

    pub fn handler(&self) -> &'a Handler {
        &self.entry.handler
    }
}

/// Route listing entry
#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub pattern: String,
    pub name: Option<String>,
    pub handler: String,
    pub middleware: Vec<String>,
}

/// Method → pattern table with regex matching
///
/// Exact pattern lookups are tried first; otherwise the method's patterns are
/// tried in registration order and the first match wins. Re-registering a
/// pattern replaces its handler but keeps its original position.
#[derive(Default)]
pub struct Router {
    routes: IndexMap<String, IndexMap<String, RouteEntry>>,
    named: Arc<NamedRoutes>,
    middleware: MiddlewareRegistry,
    controllers: ControllerRegistry,
    not_found: Option<RouteHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router resolving middleware names against `middleware`
    pub fn with_middleware(middleware: MiddlewareRegistry) -> Self {
        Self {
            middleware,
            ..Self::default()
        }
    }

    pub fn middleware(&self) -> &MiddlewareRegistry {
        &self.middleware
    }

    pub fn middleware_mut(&mut self) -> &mut MiddlewareRegistry {
        &mut self.middleware
    }

    pub fn controllers(&self) -> &ControllerRegistry {
        &self.controllers
    }

    pub fn controllers_mut(&mut self) -> &mut ControllerRegistry {
        &mut self.controllers
    }

    /// Handler used when no route matches; it starts from a 404 response
    pub fn set_not_found(&mut self, handler: RouteHandler) {
        self.not_found = Some(handler);
    }

    pub fn add(&mut self, route: Route) -> Result<()> {
        self.add_with(&GroupAttributes::default(), route)
    }

    /// Register several routes, stopping at the first failure
    pub fn add_all(&mut self, routes: Vec<Route>) -> Result<()> {
        routes.into_iter().try_for_each(|route| self.add(route))
    }

    pub(crate) fn add_with(&mut self, attributes: &GroupAttributes, route: Route) -> Result<()> {
        if route.methods.is_empty() {
            return Err(Error::config(format!(
                "Route '{}' has no HTTP method",
                route.pattern
            )));
        }

        let pattern = join_path(&attributes.prefix, &route.pattern);
        let mut refs = route.middleware;
        refs.extend(attributes.middleware.iter().cloned());
        let middleware = self.middleware.resolve(&refs).map_err(|e| {
            let message = format!("Cannot register route '{}': {}", pattern, e);
            e.with_context(message)
        })?;
        let (regex, param_names) = compile_pattern(&pattern)?;

        if let Some(name) = &route.name {
            Arc::make_mut(&mut self.named).insert(name, &pattern);
        }

        for method in &route.methods {
            let method = method.to_uppercase();
            log::debug!("Route {} {} -> {}", method, pattern, route.handler.describe());
            let entry = RouteEntry {
                pattern: pattern.clone(),
                regex: regex.clone(),
                param_names: param_names.clone(),
                handler: route.handler.clone(),
                name: route.name.clone(),
                middleware: middleware.clone(),
            };
            self.routes
                .entry(method)
                .or_default()
                .insert(pattern.clone(), entry);
        }
        Ok(())
    }

    /// Register routes sharing `attributes`
    ///
    /// ```rust,ignore
    /// router.group(GroupAttributes::new().prefix("/admin").middleware("auth"), |admin| {
    ///     admin.add(Route::get("/", dashboard))?;
    ///     admin.add(Route::action(&["GET"], "/users/{id}", "Admin/Users#show"))
    /// })?;
    /// ```
    pub fn group<F>(&mut self, attributes: GroupAttributes, build: F) -> Result<()>
    where
        F: FnOnce(&mut RouteGroup<'_>) -> Result<()>,
    {
        let mut group = RouteGroup::new(self, attributes);
        build(&mut group)
    }

    /// Find the route for `method` and `uri`
    pub fn resolve(&self, method: &str, uri: &str) -> Option<RouteMatch<'_>> {
        let table = self.routes.get(&method.to_uppercase())?;
        let path = normalize_path(uri);

        if let Some(entry) = table.get(&path) {
            return Some(RouteMatch {
                entry,
                params: Vec::new(),
            });
        }

        table.values().find_map(|entry| {
            let captures = entry.regex.captures(&path)?;
            let params = captures
                .iter()
                .skip(1)
                .flatten()
                .map(|m| decode_segment(m.as_str()))
                .collect();
            Some(RouteMatch { entry, params })
        })
    }

    /// Run the matching route: its middleware strictly in order, then the handler
    pub async fn dispatch(&self, ctx: &mut Context) -> Result<Response> {
        let method = ctx.req.method.clone();
        let path = ctx.path().to_string();

        let matched = match self.resolve(&method, &path) {
            Some(matched) => matched,
            None => {
                log::debug!("No route for {} {}", method, path);
                return self.handle_not_found(ctx).await;
            }
        };

        log::debug!("{} {} matched {}", method, path, matched.pattern());
        ctx.set_params(matched.params.clone(), matched.param_names().to_vec());

        let mut outbound = Vec::new();
        let result = run_inbound(&matched.entry.middleware, ctx, &mut outbound).await?;
        if result == MiddlewareResult::Continue {
            self.run_handler(matched.handler(), ctx).await?;
        }
        run_outbound(&outbound, ctx).await?;

        Ok(ctx.take_response().unwrap_or_else(Response::internal_error))
    }

    async fn run_handler(&self, handler: &Handler, ctx: &mut Context) -> Result<()> {
        match handler {
            Handler::Function(function) => function(ctx).await,
            Handler::Action(descriptor) => match self.controllers.resolve(descriptor) {
                Ok(action) => action(ctx).await,
                Err(e) => {
                    log::error!("Cannot dispatch '{}': {}", descriptor, e);
                    ctx.set_response(
                        Response::text(e.to_string()).with_status(StatusCode::INTERNAL_SERVER_ERROR),
                    );
                    Ok(())
                }
            },
        }
    }

    async fn handle_not_found(&self, ctx: &mut Context) -> Result<Response> {
        match self.not_found {
            Some(handler) => {
                ctx.set_response(Response::new(StatusCode::NOT_FOUND));
                handler(ctx).await?;
                Ok(ctx.take_response().unwrap_or_else(not_found_response))
            }
            None => Ok(not_found_response()),
        }
    }

    /// Reverse routing; `#` when no route has that name
    pub fn url(&self, name: &str, params: &Map<String, Value>) -> String {
        self.named.url(name, params)
    }

    pub fn named_routes(&self) -> Arc<NamedRoutes> {
        Arc::clone(&self.named)
    }

    /// Every registered route, grouped by method in registration order
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.routes
            .iter()
            .flat_map(|(method, table)| {
                table.values().map(move |entry| RouteInfo {
                    method: method.clone(),
                    pattern: entry.pattern.clone(),
                    name: entry.name.clone(),
                    handler: entry.handler.describe(),
                    middleware: entry.middleware.iter().map(|m| m.name.clone()).collect(),
                })
            })
            .collect()
    }

    pub fn route_count(&self) -> usize {
        self.routes.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.route_count() == 0
    }
}

/// `/users/{id}` → `^/users/([^/]+)$`, literal text escaped
fn compile_pattern(pattern: &str) -> Result<(Regex, Vec<String>)> {
    let mut source = String::from("^");
    let mut names = Vec::new();
    let mut last = 0;

    for captures in PARAM_PATTERN.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        source.push_str(&regex::escape(&pattern[last..whole.start()]));
        source.push_str("([^/]+)");
        names.push(name.as_str().to_string());
        last = whole.end();
    }
    source.push_str(&regex::escape(&pattern[last..]));
    source.push('$');

    let regex = Regex::new(&source)
        .map_err(|e| Error::internal(format!("Invalid route pattern '{}': {}", pattern, e)))?;
    Ok((regex, names))
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{InboundAction, MiddlewareRef};
    use futures::future::BoxFuture;
    use serde_json::json;

    fn noop(_ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn test_exact_match_before_patterns() {
        let mut router = Router::new();
        router.add(Route::get("/users/{id}", noop)).unwrap();
        router.add(Route::get("/users/new", noop)).unwrap();

        let matched = router.resolve("GET", "/users/new").unwrap();
        assert_eq!(matched.pattern(), "/users/new");
        assert!(matched.params.is_empty());

        let matched = router.resolve("get", "/users/42/").unwrap();
        assert_eq!(matched.pattern(), "/users/{id}");
        assert_eq!(matched.params, vec!["42"]);
        assert_eq!(matched.param_names(), ["id".to_string()]);
    }

    #[test]
    fn test_first_registered_pattern_wins() {
        let mut router = Router::new();
        router.add(Route::get("/{section}/{page}", noop).name("first")).unwrap();
        router.add(Route::get("/docs/{page}", noop).name("second")).unwrap();

        let matched = router.resolve("GET", "/docs/intro").unwrap();
        assert_eq!(matched.name(), Some("first"));
        assert_eq!(matched.params, vec!["docs", "intro"]);
    }

    #[test]
    fn test_method_and_segment_rules() {
        let mut router = Router::new();
        router.add(Route::post("/items/{id}", noop)).unwrap();

        assert!(router.resolve("GET", "/items/1").is_none());
        assert!(router.resolve("POST", "/items/").is_none());
        assert!(router.resolve("POST", "/items/1/extra").is_none());
        assert!(router.resolve("POST", "/items/1?x=2").is_some());
        assert!(router.resolve("DELETE", "/items/1").is_none());
    }

    #[test]
    fn test_literal_characters_are_escaped() {
        let mut router = Router::new();
        router.add(Route::get("/feed.xml", noop)).unwrap();
        router.add(Route::get("/files/{name}.txt", noop)).unwrap();

        assert!(router.resolve("GET", "/feedxxml").is_none());
        assert_eq!(router.resolve("GET", "/files/a%20b.txt").unwrap().params, vec!["a b"]);
    }

    #[test]
    fn test_reregistering_keeps_position() {
        let mut router = Router::new();
        router.add(Route::get("/a/{x}", noop).name("a")).unwrap();
        router.add(Route::get("/{y}/b", noop).name("b")).unwrap();
        router.add(Route::get("/a/{x}", noop).name("a2")).unwrap();

        assert_eq!(router.route_count(), 2);
        assert_eq!(router.resolve("GET", "/a/b").unwrap().name(), Some("a2"));
    }

    #[test]
    fn test_named_routes_and_urls() {
        let mut router = Router::new();
        router
            .add(Route::get("/users/{id}/posts/{post}", noop).name("user.post"))
            .unwrap();

        let params = json!({"id": 7, "post": "hello"});
        assert_eq!(
            router.url("user.post", params.as_object().unwrap()),
            "/users/7/posts/hello"
        );
        assert_eq!(router.url("missing", &Map::new()), "#");
        assert_eq!(router.url("user.post", &Map::new()), "/users/{id}/posts/{post}");
        assert_eq!(router.named_routes().len(), 1);
    }

    #[test]
    fn test_groups_prefix_and_middleware() {
        let mut registry = MiddlewareRegistry::new();
        registry.register_fn("auth", |_ctx| Ok(InboundAction::Continue));
        registry.register_fn("audit", |_ctx| Ok(InboundAction::Continue));
        let mut router = Router::with_middleware(registry);

        router
            .group(GroupAttributes::new().prefix("/admin").middleware("auth"), |admin| {
                admin.add(Route::get("/", noop).middleware("audit"))?;
                admin.group(GroupAttributes::new().prefix("reports"), |reports| {
                    reports.add(Route::get("/{year}", noop).name("reports.year"))
                })
            })
            .unwrap();
        router.add(Route::get("/public", noop)).unwrap();

        let routes = router.routes();
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[0].pattern, "/admin");
        assert_eq!(routes[0].middleware, vec!["audit", "auth"]);
        assert_eq!(routes[1].pattern, "/admin/reports/{year}");
        assert_eq!(routes[1].middleware, vec!["auth"]);
        assert!(routes[2].middleware.is_empty());
    }

    #[test]
    fn test_unknown_middleware_is_rejected() {
        let mut router = Router::new();
        let err = router
            .add(Route::get("/", noop).middleware("missing"))
            .unwrap_err();
        assert!(err.to_string().contains("'missing' is not registered"));
        assert_eq!(router.route_count(), 0);

        router
            .add(Route::get("/", noop).middleware(MiddlewareRef::func("inline", |_ctx| {
                Ok(InboundAction::Continue)
            })))
            .unwrap();
        assert_eq!(router.routes()[0].middleware, vec!["inline"]);
    }

    #[test]
    fn test_failed_group_leaves_router_usable() {
        let mut router = Router::new();
        let result = router.group(GroupAttributes::new().prefix("/broken"), |group| {
            group.add(Route::get("/ok", noop))?;
            group.add(Route::get("/bad", noop).middleware("missing"))
        });
        assert!(result.is_err());

        router.add(Route::get("/after", noop)).unwrap();
        let patterns: Vec<String> = router.routes().into_iter().map(|r| r.pattern).collect();
        assert_eq!(patterns, vec!["/broken/ok", "/after"]);
    }
}

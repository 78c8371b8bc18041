use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::routing::NamedRoutes;
use crate::session::Session;
use crate::views::{RenderContext, ViewEngine};
use hyper::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-request state handed to middleware and handlers
///
/// The response slot starts as an empty `200 OK`; helpers such as
/// [`Context::view`] or [`Context::redirect`] fill it in while keeping headers
/// set earlier by middleware.
pub struct Context {
    pub req: Request,
    pub res: Option<Response>,
    request_id: String,
    session: Option<Arc<Session>>,
    views: Arc<ViewEngine>,
    routes: Arc<NamedRoutes>,
    params: Vec<String>,
    param_names: Vec<String>,
    /// Storage for middleware data (not accessible in views)
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
    cached_form: Option<HashMap<String, String>>,
}

impl Context {
    pub fn new(request: Request, views: Arc<ViewEngine>, routes: Arc<NamedRoutes>) -> Self {
        Self {
            req: request,
            res: Some(Response::ok()),
            request_id: uuid::Uuid::new_v4().to_string(),
            session: None,
            views,
            routes,
            params: Vec::new(),
            param_names: Vec::new(),
            data: HashMap::new(),
            cached_form: None,
        }
    }

    /// Random id used to correlate log lines of one request
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    // Response slot

    pub fn set_response(&mut self, response: Response) {
        self.res = Some(response);
    }

    pub fn get_response(&self) -> Option<&Response> {
        self.res.as_ref()
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.res.take()
    }

    /// Replace body and content type, keeping other headers
    fn update_response_body(&mut self, body: Vec<u8>, content_type: &str, status: Option<StatusCode>) {
        let response = self.res.get_or_insert_with(Response::ok);
        if let Some(status) = status {
            response.status = status;
        }
        response.body = body;
        response
            .headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("content-type"));
        response.add_header("Content-Type", content_type);
    }

    // Middleware data

    pub fn set<T: Any + Send + Sync + 'static>(&mut self, key: &str, value: T) -> Result<()> {
        self.data.insert(key.to_string(), Box::new(value));
        Ok(())
    }

    pub fn get<T: Any + Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn has_data(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    // Session

    pub fn set_session(&mut self, session: Option<Arc<Session>>) {
        self.session = session;
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_deref()
    }

    pub fn session_arc(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn require_session(&self) -> Result<&Session> {
        self.session()
            .ok_or_else(|| Error::session("No session available; is the session middleware enabled?"))
    }

    pub fn session_set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        self.require_session()?.set(key, value)
    }

    pub fn session_get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.session()?.get(key)
    }

    pub fn session_remove(&self, key: &str) -> Option<Value> {
        self.session()?.remove(key)
    }

    /// Store a flash value, consumed by the next read
    pub fn flash(&self, key: &str, value: impl Serialize) -> Result<()> {
        self.require_session()?.flash_set(key, value)
    }

    pub fn get_flash(&self, key: &str) -> Option<Value> {
        self.session()?.flash_get(key)
    }

    /// One-time message rendered by `@notification('<kind>')`
    pub fn notify(&self, kind: &str, message: impl Into<String>) -> Result<()> {
        self.require_session()?.notify(kind, message)
    }

    // Route parameters

    pub(crate) fn set_params(&mut self, params: Vec<String>, names: Vec<String>) {
        self.params = params;
        self.param_names = names;
    }

    /// Positional route capture, starting at 0
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Route capture by its `{name}` in the pattern
    pub fn named_param(&self, name: &str) -> Option<&str> {
        let index = self.param_names.iter().position(|n| n == name)?;
        self.param(index)
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    // Request helpers

    pub fn path(&self) -> &str {
        self.req.path()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.req.header(name)
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.req.query.get(key).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.req.cookie(name)
    }

    pub fn is_xhr(&self) -> bool {
        self.req.is_xhr()
    }

    /// URL-encoded form fields, parsed once
    pub fn form(&mut self) -> &HashMap<String, String> {
        let req = &self.req;
        self.cached_form.get_or_insert_with(|| req.body_as_form())
    }

    pub fn form_value(&mut self, key: &str) -> Option<String> {
        self.form().get(key).cloned()
    }

    /// `scheme://host` of the request, when a Host header is present
    pub fn base_url(&self) -> Option<String> {
        let host = self.header("host")?;
        let scheme = self.header("x-forwarded-proto").unwrap_or("http");
        Some(format!("{}://{}", scheme, host))
    }

    // Views

    pub fn views(&self) -> &Arc<ViewEngine> {
        &self.views
    }

    pub fn routes(&self) -> &Arc<NamedRoutes> {
        &self.routes
    }

    /// Collaborators available to templates rendered for this request
    pub fn render_context(&self) -> RenderContext {
        let mut context = RenderContext::new().with_routes(Arc::clone(&self.routes));
        if let Some(session) = &self.session {
            context = context.with_session(Arc::clone(session));
        }
        if let Some(base_url) = self.base_url() {
            context = context.with_base_url(base_url);
        }
        context
    }

    /// Render a view into the response
    pub fn view(&mut self, template: &str, data: Value) -> Result<()> {
        let context = self.render_context();
        let html = self.views.render_with(template, &data, &context)?;
        self.update_response_body(html.into_bytes(), "text/html; charset=utf-8", None);
        Ok(())
    }

    /// Reverse routing through the named route table
    pub fn url(&self, name: &str, params: &serde_json::Map<String, Value>) -> String {
        self.routes.url(name, params)
    }

    // Responses

    pub fn html(&mut self, content: impl Into<String>) -> Result<()> {
        self.update_response_body(content.into().into_bytes(), "text/html; charset=utf-8", None);
        Ok(())
    }

    pub fn text(&mut self, content: impl Into<String>) -> Result<()> {
        self.update_response_body(content.into().into_bytes(), "text/plain; charset=utf-8", None);
        Ok(())
    }

    pub fn json<T: Serialize>(&mut self, data: T) -> Result<()> {
        let json_string = serde_json::to_string(&data)?;
        self.update_response_body(json_string.into_bytes(), "application/json", None);
        Ok(())
    }

    pub fn redirect(&mut self, location: &str) -> Result<()> {
        let response = self.res.get_or_insert_with(Response::ok);
        response.status = StatusCode::FOUND;
        response.body = Vec::new();
        response
            .headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("location"));
        response.add_header("Location", location);
        Ok(())
    }

    pub fn status(&mut self, status: StatusCode) {
        if let Some(response) = self.res.as_mut() {
            response.status = status;
        }
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        if let Some(response) = self.res.as_mut() {
            response.add_header(name, value);
        }
    }

    fn throw(&mut self, status: StatusCode, message: Option<&str>) -> Result<()> {
        let body = message.unwrap_or_else(|| status.canonical_reason().unwrap_or("Error"));
        self.update_response_body(
            body.as_bytes().to_vec(),
            "text/plain; charset=utf-8",
            Some(status),
        );
        Ok(())
    }

    pub fn throw400(&mut self, message: Option<&str>) -> Result<()> {
        self.throw(StatusCode::BAD_REQUEST, message)
    }

    pub fn throw403(&mut self, message: Option<&str>) -> Result<()> {
        self.throw(StatusCode::FORBIDDEN, message)
    }

    pub fn throw404(&mut self, message: Option<&str>) -> Result<()> {
        self.throw(StatusCode::NOT_FOUND, message)
    }

    pub fn throw500(&mut self, message: Option<&str>) -> Result<()> {
        self.throw(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

use crate::config::CsrfSettings;
use crate::context::Context;
use crate::error::Result;
use crate::middleware::{InboundAction, InboundMiddleware};
use crate::session::Session;
use async_trait::async_trait;
use rand::RngCore;
use serde_json::json;
use std::collections::HashSet;

/// Session key and form field carrying the CSRF token
pub const TOKEN_KEY: &str = "_token";

/// Header accepted as an alternative to the form field
pub const TOKEN_HEADER: &str = "x-csrf-token";

/// Fresh token: 32 random bytes, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Return the session token, creating and storing one if absent
pub fn ensure_token(session: &Session) -> Result<String> {
    if let Some(token) = session.get::<String>(TOKEN_KEY).filter(|t| !t.is_empty()) {
        return Ok(token);
    }
    let token = generate_token();
    session.set(TOKEN_KEY, &token)?;
    Ok(token)
}

/// Compare a submitted token with the session token in constant time
pub fn verify_token(session: &Session, submitted: &str) -> bool {
    match session.get::<String>(TOKEN_KEY) {
        Some(expected) if !expected.is_empty() => constant_time_eq(expected.as_bytes(), submitted.as_bytes()),
        _ => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// CSRF protection configuration
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Routes to exempt from CSRF protection (supports `/prefix/*`)
    pub exempt_routes: Vec<String>,
    pub protected_methods: HashSet<String>,
    pub enabled: bool,
    pub error_message: String,
    /// Redirect URL on failure; when unset a 403 response is returned
    pub redirect_on_failure: Option<String>,
    /// Notification type used to report the failure
    pub notification_type: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        let protected_methods = ["POST", "PUT", "PATCH", "DELETE"]
            .iter()
            .map(|m| m.to_string())
            .collect();

        Self {
            exempt_routes: vec!["/api/*".to_string()],
            protected_methods,
            enabled: true,
            error_message: "CSRF token validation failed. Please try again.".to_string(),
            redirect_on_failure: None,
            notification_type: "error".to_string(),
        }
    }
}

impl CsrfConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exempt<S: Into<String>>(mut self, route: S) -> Self {
        self.exempt_routes.push(route.into());
        self
    }

    pub fn error_message<S: Into<String>>(mut self, message: S) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn redirect_on_failure<S: Into<String>>(mut self, url: S) -> Self {
        self.redirect_on_failure = Some(url.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn protect_method<S: Into<String>>(mut self, method: S) -> Self {
        self.protected_methods.insert(method.into().to_uppercase());
        self
    }

    pub fn exempt_method<S: Into<String>>(mut self, method: S) -> Self {
        self.protected_methods.remove(&method.into().to_uppercase());
        self
    }
}

impl From<&CsrfSettings> for CsrfConfig {
    fn from(settings: &CsrfSettings) -> Self {
        Self {
            exempt_routes: settings.exempt_routes.clone(),
            enabled: settings.enabled,
            redirect_on_failure: settings.redirect_on_failure.clone(),
            ..Self::default()
        }
    }
}

/// CSRF protection middleware
///
/// Requests using a protected method must carry the session token in the
/// `_token` form field or the `X-CSRF-TOKEN` header.
#[derive(Clone, Default)]
pub struct CsrfMiddleware {
    config: CsrfConfig,
}

impl CsrfMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CsrfConfig) -> Self {
        Self { config }
    }

    fn requires_protection(&self, method: &str) -> bool {
        self.config
            .protected_methods
            .contains(&method.to_uppercase())
    }

    fn is_route_exempt(&self, path: &str) -> bool {
        self.config
            .exempt_routes
            .iter()
            .any(|pattern| matches_pattern(path, pattern))
    }

    fn submitted_token(&self, ctx: &mut Context) -> Option<String> {
        if let Some(token) = ctx.header(TOKEN_HEADER) {
            return Some(token.to_string());
        }
        ctx.form_value(TOKEN_KEY)
    }

    fn handle_csrf_failure(&self, ctx: &mut Context) -> Result<InboundAction> {
        log::warn!(
            "CSRF validation failed for {} {}",
            ctx.req.method,
            ctx.path()
        );
        if ctx.session().is_some() {
            ctx.notify(&self.config.notification_type, &self.config.error_message)?;
        }

        if let Some(redirect_url) = &self.config.redirect_on_failure {
            ctx.redirect(redirect_url)?;
        } else if ctx
            .header("accept")
            .map(|accept| accept.contains("application/json"))
            .unwrap_or(false)
        {
            ctx.json(json!({
                "error": "csrf_token_invalid",
                "message": self.config.error_message
            }))?;
            if let Some(response) = ctx.res.as_mut() {
                response.status = hyper::StatusCode::FORBIDDEN;
            }
        } else {
            ctx.throw403(Some(&self.config.error_message))?;
        }

        Ok(InboundAction::Stop)
    }
}

/// Route glob matching: `/prefix/*` matches the prefix and anything below it
pub(crate) fn matches_pattern(path: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/*") {
        match path.strip_prefix(prefix) {
            Some(remaining) => remaining.starts_with('/') || remaining.is_empty(),
            None => false,
        }
    } else {
        path == pattern
    }
}

#[async_trait]
impl InboundMiddleware for CsrfMiddleware {
    async fn process_request(&self, ctx: &mut Context) -> Result<InboundAction> {
        if !self.config.enabled
            || !self.requires_protection(&ctx.req.method)
            || self.is_route_exempt(ctx.path())
        {
            return Ok(InboundAction::Continue);
        }

        let valid = match (ctx.session_arc().cloned(), self.submitted_token(ctx)) {
            (Some(session), Some(token)) => verify_token(&session, &token),
            _ => false,
        };

        if !valid {
            return self.handle_csrf_failure(ctx);
        }
        Ok(InboundAction::Continue)
    }

    fn name(&self) -> &'static str {
        "csrf"
    }

    fn priority(&self) -> i32 {
        -25
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrf_config_default() {
        let config = CsrfConfig::default();

        assert!(config.enabled);
        assert!(config.protected_methods.contains("POST"));
        assert!(config.protected_methods.contains("DELETE"));
        assert!(!config.protected_methods.contains("GET"));
        assert_eq!(config.exempt_routes, vec!["/api/*"]);
    }

    #[test]
    fn test_csrf_config_builder() {
        let config = CsrfConfig::new()
            .exempt("/webhook/*")
            .error_message("Custom error")
            .redirect_on_failure("/login")
            .protect_method("custom")
            .exempt_method("DELETE");

        assert!(config.exempt_routes.contains(&"/webhook/*".to_string()));
        assert_eq!(config.error_message, "Custom error");
        assert_eq!(config.redirect_on_failure, Some("/login".to_string()));
        assert!(config.protected_methods.contains("CUSTOM"));
        assert!(!config.protected_methods.contains("DELETE"));
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("/api/users", "/api/*"));
        assert!(matches_pattern("/api", "/api/*"));
        assert!(!matches_pattern("/apix", "/api/*"));
        assert!(!matches_pattern("/public/api", "/api/*"));
        assert!(matches_pattern("/webhook", "/webhook"));
        assert!(!matches_pattern("/webhooks", "/webhook"));
    }

    #[test]
    fn test_requires_protection() {
        let middleware = CsrfMiddleware::new();
        assert!(middleware.requires_protection("post"));
        assert!(middleware.requires_protection("PATCH"));
        assert!(!middleware.requires_protection("GET"));
        assert!(!middleware.requires_protection("HEAD"));
    }

    #[test]
    fn test_token_lifecycle() {
        let session = Session::new("abc");
        let token = ensure_token(&session).unwrap();

        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ensure_token(&session).unwrap(), token);
        assert!(verify_token(&session, &token));
        assert!(!verify_token(&session, "nope"));
        assert!(!verify_token(&Session::new("other"), &token));
    }
}

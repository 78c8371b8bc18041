use crate::config::SessionConfig;
use crate::context::Context;
use crate::error::Result;
use crate::middleware::traits::{InboundAction, InboundMiddleware, OutboundMiddleware};
use crate::security::csrf::matches_pattern;
use crate::session::SessionStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Session middleware using the dual-phase pattern
///
/// The inbound phase loads the session named by the cookie, or creates one.
/// The outbound phase saves it and refreshes the cookie.
#[derive(Clone)]
pub struct SessionMiddleware {
    store: SessionStore,
}

impl SessionMiddleware {
    /// In-memory sessions configured from the `[session]` section
    pub fn new(config: SessionConfig) -> Self {
        Self {
            store: SessionStore::new(config),
        }
    }

    pub fn with_store(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn is_route_exempt(&self, path: &str) -> bool {
        self.store
            .config()
            .exempt_routes
            .iter()
            .any(|pattern| matches_pattern(path, pattern))
    }
}

impl Default for SessionMiddleware {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[async_trait]
impl InboundMiddleware for SessionMiddleware {
    async fn process_request(&self, ctx: &mut Context) -> Result<InboundAction> {
        if !self.store.config().enabled || self.is_route_exempt(ctx.path()) {
            return Ok(InboundAction::Continue);
        }

        let session_id = ctx.req.cookie(&self.store.config().cookie_name);
        let session = match self.store.load_or_create(session_id.as_deref()).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("Session middleware: failed to load session: {}", e);
                return Err(e);
            }
        };

        if session_id.as_deref() != Some(session.id()) {
            log::debug!("Started session {}", session.id());
        }
        ctx.set_session(Some(Arc::new(session)));

        // The cookie is refreshed on every response
        Ok(InboundAction::Capture)
    }

    fn name(&self) -> &'static str {
        "session"
    }

    fn priority(&self) -> i32 {
        -500
    }
}

#[async_trait]
impl OutboundMiddleware for SessionMiddleware {
    async fn process_response(&self, ctx: &mut Context) -> Result<()> {
        let session = match ctx.session_arc() {
            Some(session) => Arc::clone(session),
            None => return Ok(()),
        };

        self.store.save(&session).await?;

        let cookie = self.store.create_cookie(session.id());
        if let Some(response) = ctx.res.as_mut() {
            response.add_header("Set-Cookie", &cookie);
        }
        Ok(())
    }
}

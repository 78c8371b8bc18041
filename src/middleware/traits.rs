//! Inbound/outbound middleware traits
//!
//! Middleware are gatekeepers: the inbound phase decides whether a request
//! proceeds, and middleware that asked to see the response get an outbound
//! phase after the handler has run.

use crate::context::Context;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Decision returned by an inbound middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundAction {
    /// Continue to the next middleware in the chain
    Continue,

    /// Stop the chain and emit the response set on the context
    Stop,

    /// Continue, and run this middleware's outbound phase afterwards
    Capture,
}

/// Middleware that inspects a request before the handler runs
#[async_trait]
pub trait InboundMiddleware: Send + Sync + 'static {
    /// Stopping is not an error; the response already on the context is sent
    async fn process_request(&self, ctx: &mut Context) -> Result<InboundAction>;

    fn name(&self) -> &'static str {
        "unnamed"
    }

    /// Lower numbers run first among global middleware
    fn priority(&self) -> i32 {
        0
    }

    fn should_run(&self, _ctx: &Context) -> bool {
        true
    }
}

/// Middleware that post-processes the response through `ctx.res`
///
/// Runs in reverse order of the inbound phase.
#[async_trait]
pub trait OutboundMiddleware: Send + Sync + 'static {
    async fn process_response(&self, ctx: &mut Context) -> Result<()>;
}

/// Marker for middleware implementing both phases
pub trait DualPhaseMiddleware: InboundMiddleware + OutboundMiddleware {}

impl<T> DualPhaseMiddleware for T where T: InboundMiddleware + OutboundMiddleware {}

type InboundFn = dyn Fn(&mut Context) -> Result<InboundAction> + Send + Sync;

/// Inline middleware built from a closure
///
/// ```rust,ignore
/// let only_admins = FnMiddleware::new("admin", |ctx| {
///     if ctx.session_get::<bool>("is_admin").unwrap_or(false) {
///         return Ok(InboundAction::Continue);
///     }
///     ctx.redirect("/login")?;
///     Ok(InboundAction::Stop)
/// });
/// ```
#[derive(Clone)]
pub struct FnMiddleware {
    name: &'static str,
    handler: Arc<InboundFn>,
}

impl FnMiddleware {
    pub fn new<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&mut Context) -> Result<InboundAction> + Send + Sync + 'static,
    {
        Self {
            name,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl InboundMiddleware for FnMiddleware {
    async fn process_request(&self, ctx: &mut Context) -> Result<InboundAction> {
        (self.handler)(ctx)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// A middleware with its phases and ordering information
pub struct MiddlewareInstance {
    pub name: String,
    pub priority: i32,
    pub inbound: Option<Box<dyn InboundMiddleware>>,
    pub outbound: Option<Box<dyn OutboundMiddleware>>,
}

impl MiddlewareInstance {
    pub fn inbound<M: InboundMiddleware>(name: &str, middleware: M) -> Self {
        let priority = middleware.priority();
        Self {
            name: name.to_string(),
            priority,
            inbound: Some(Box::new(middleware)),
            outbound: None,
        }
    }

    pub fn outbound<M: OutboundMiddleware>(name: &str, middleware: M) -> Self {
        Self {
            name: name.to_string(),
            priority: 0,
            inbound: None,
            outbound: Some(Box::new(middleware)),
        }
    }

    pub fn dual<M>(name: &str, middleware: M) -> Self
    where
        M: InboundMiddleware + OutboundMiddleware + Clone + 'static,
    {
        let priority = middleware.priority();
        Self {
            name: name.to_string(),
            priority,
            inbound: Some(Box::new(middleware.clone())),
            outbound: Some(Box::new(middleware)),
        }
    }

    pub fn has_inbound(&self) -> bool {
        self.inbound.is_some()
    }

    pub fn has_outbound(&self) -> bool {
        self.outbound.is_some()
    }
}

impl std::fmt::Debug for MiddlewareInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareInstance")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("inbound", &self.has_inbound())
            .field("outbound", &self.has_outbound())
            .finish()
    }
}

//! Squehub middleware system
//!
//! Middleware are gatekeepers with an optional response phase:
//!
//! - the **inbound** phase runs before the handler and returns
//!   [`InboundAction::Continue`], [`InboundAction::Capture`] or
//!   [`InboundAction::Stop`]. Stopping short-circuits the chain and sends the
//!   response already set on the context (a redirect, a 403, ...).
//! - the **outbound** phase runs after the handler, in reverse order, for
//!   every middleware that answered `Capture` and has one.
//!
//! Middleware are registered by name in a [`MiddlewareRegistry`] and
//! referenced from routes through [`MiddlewareRef`]. Names are resolved when
//! the route is registered, so a typo fails at startup instead of on the
//! first request.
//!
//! ```rust,ignore
//! use squehub::prelude::*;
//!
//! struct AuthMiddleware;
//!
//! #[async_trait]
//! impl InboundMiddleware for AuthMiddleware {
//!     async fn process_request(&self, ctx: &mut Context) -> Result<InboundAction> {
//!         if ctx.session_get::<i64>("user_id").is_some() {
//!             return Ok(InboundAction::Continue);
//!         }
//!         ctx.redirect("/login")?;
//!         Ok(InboundAction::Stop)
//!     }
//! }
//!
//! let app = Squehub::new()
//!     .middleware_from(|registry| registry.register_inbound("auth", AuthMiddleware));
//! ```

pub mod builtin;
pub mod traits;

pub use traits::{
    DualPhaseMiddleware, FnMiddleware, InboundAction, InboundMiddleware, MiddlewareInstance,
    OutboundMiddleware,
};

use crate::context::Context;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::sync::Arc;

/// Outcome of an inbound pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareResult {
    /// Every middleware let the request through
    Continue,

    /// A middleware stopped the chain; its response is on the context
    Stop,
}

/// Reference to a middleware from a route or group
#[derive(Clone)]
pub enum MiddlewareRef {
    /// Looked up in the [`MiddlewareRegistry`] when the route is added
    Named(String),
    /// Used as is
    Inline(Arc<MiddlewareInstance>),
}

impl MiddlewareRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn inbound<M: InboundMiddleware>(name: &str, middleware: M) -> Self {
        Self::Inline(Arc::new(MiddlewareInstance::inbound(name, middleware)))
    }

    pub fn dual<M>(name: &str, middleware: M) -> Self
    where
        M: InboundMiddleware + OutboundMiddleware + Clone + 'static,
    {
        Self::Inline(Arc::new(MiddlewareInstance::dual(name, middleware)))
    }

    /// Inline closure middleware
    pub fn func<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&mut Context) -> Result<InboundAction> + Send + Sync + 'static,
    {
        Self::inbound(name, FnMiddleware::new(name, handler))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Inline(instance) => &instance.name,
        }
    }
}

impl From<&str> for MiddlewareRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for MiddlewareRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<FnMiddleware> for MiddlewareRef {
    fn from(middleware: FnMiddleware) -> Self {
        let name = middleware.name();
        Self::inbound(name, middleware)
    }
}

impl std::fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => write!(f, "Named({})", name),
            Self::Inline(instance) => write!(f, "Inline({})", instance.name),
        }
    }
}

/// Named middleware instances
#[derive(Default)]
pub struct MiddlewareRegistry {
    middleware: IndexMap<String, Arc<MiddlewareInstance>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an inbound-only middleware
    pub fn register_inbound<M: InboundMiddleware>(&mut self, name: &str, middleware: M) {
        self.insert(MiddlewareInstance::inbound(name, middleware));
    }

    /// Register an outbound-only middleware
    pub fn register_outbound<M: OutboundMiddleware>(&mut self, name: &str, middleware: M) {
        self.insert(MiddlewareInstance::outbound(name, middleware));
    }

    /// Register a dual-phase middleware
    pub fn register_dual<M>(&mut self, name: &str, middleware: M)
    where
        M: InboundMiddleware + OutboundMiddleware + Clone + 'static,
    {
        self.insert(MiddlewareInstance::dual(name, middleware));
    }

    /// Register a closure as an inbound middleware
    pub fn register_fn<F>(&mut self, name: &'static str, handler: F)
    where
        F: Fn(&mut Context) -> Result<InboundAction> + Send + Sync + 'static,
    {
        self.insert(MiddlewareInstance::inbound(name, FnMiddleware::new(name, handler)));
    }

    fn insert(&mut self, instance: MiddlewareInstance) {
        if self.middleware.contains_key(&instance.name) {
            log::warn!("Middleware '{}' registered twice, replacing", instance.name);
        }
        self.middleware
            .insert(instance.name.clone(), Arc::new(instance));
    }

    pub fn get(&self, name: &str) -> Option<Arc<MiddlewareInstance>> {
        self.middleware.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.middleware.contains_key(name)
    }

    /// Resolve route references; an unknown name is an error
    pub fn resolve(&self, refs: &[MiddlewareRef]) -> Result<Vec<Arc<MiddlewareInstance>>> {
        refs.iter()
            .map(|reference| match reference {
                MiddlewareRef::Named(name) => self.get(name).ok_or_else(|| {
                    Error::middleware(format!("Middleware '{}' is not registered", name))
                }),
                MiddlewareRef::Inline(instance) => Ok(Arc::clone(instance)),
            })
            .collect()
    }

    /// All instances ordered by priority; equal priorities keep registration order
    pub fn get_sorted(&self) -> Vec<Arc<MiddlewareInstance>> {
        let mut sorted: Vec<Arc<MiddlewareInstance>> = self.middleware.values().cloned().collect();
        sorted.sort_by_key(|m| m.priority);
        sorted
    }

    pub fn names(&self) -> Vec<&str> {
        self.middleware.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }
}

/// Run the inbound phase of `middleware` strictly in order
///
/// Capturing middleware with an outbound phase are pushed onto `outbound`,
/// as are outbound-only middleware.
pub(crate) async fn run_inbound<'m>(
    middleware: &'m [Arc<MiddlewareInstance>],
    ctx: &mut Context,
    outbound: &mut Vec<&'m MiddlewareInstance>,
) -> Result<MiddlewareResult> {
    for instance in middleware {
        let inbound = match &instance.inbound {
            Some(inbound) => inbound,
            None => {
                outbound.push(instance);
                continue;
            }
        };
        if !inbound.should_run(ctx) {
            continue;
        }

        log::debug!(
            "Executing inbound middleware '{}' (priority: {})",
            instance.name,
            instance.priority
        );
        match inbound.process_request(ctx).await? {
            InboundAction::Continue => {}
            InboundAction::Capture => {
                if instance.has_outbound() {
                    outbound.push(instance);
                }
            }
            InboundAction::Stop => {
                log::debug!("Middleware '{}' stopped the chain", instance.name);
                return Ok(MiddlewareResult::Stop);
            }
        }
    }
    Ok(MiddlewareResult::Continue)
}

/// Run outbound phases in reverse order of the inbound pass
pub(crate) async fn run_outbound(outbound: &[&MiddlewareInstance], ctx: &mut Context) -> Result<()> {
    for instance in outbound.iter().rev() {
        if let Some(phase) = &instance.outbound {
            log::debug!("Executing outbound middleware '{}'", instance.name);
            phase.process_response(ctx).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Early;

    #[async_trait::async_trait]
    impl InboundMiddleware for Early {
        async fn process_request(&self, _ctx: &mut Context) -> Result<InboundAction> {
            Ok(InboundAction::Continue)
        }

        fn priority(&self) -> i32 {
            -10
        }
    }

    #[test]
    fn test_registry_sorts_by_priority() {
        let mut registry = MiddlewareRegistry::new();
        registry.register_fn("late", |_ctx| Ok(InboundAction::Continue));
        registry.register_inbound("early", Early);

        let names: Vec<String> = registry
            .get_sorted()
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(names, vec!["early", "late"]);
        assert_eq!(registry.names(), vec!["late", "early"]);
    }

    #[test]
    fn test_resolve_unknown_name_fails() {
        let mut registry = MiddlewareRegistry::new();
        registry.register_inbound("early", Early);

        let refs = vec![
            MiddlewareRef::from("early"),
            MiddlewareRef::func("inline", |_ctx| Ok(InboundAction::Continue)),
        ];
        let resolved = registry.resolve(&refs).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].name, "inline");

        let err = registry.resolve(&["missing".into()]).unwrap_err();
        assert!(matches!(err, Error::Middleware(_)));
        assert!(err.to_string().contains("'missing'"));
    }
}

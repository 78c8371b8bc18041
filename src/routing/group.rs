use super::{Route, Router};
use crate::error::Result;
use crate::middleware::MiddlewareRef;

/// Attributes shared by every route of a group
///
/// Values are immutable once handed to [`Router::group`]; nesting produces a
/// merged copy, so leaving a group never needs to restore anything.
#[derive(Debug, Clone, Default)]
pub struct GroupAttributes {
    pub prefix: String,
    pub middleware: Vec<MiddlewareRef>,
}

impl GroupAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn middleware(mut self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.middleware.push(middleware.into());
        self
    }

    /// Attributes of a group nested inside `self`
    ///
    /// Prefixes are joined outer first; middleware run outer first.
    pub fn merge(&self, inner: &GroupAttributes) -> GroupAttributes {
        let mut middleware = self.middleware.clone();
        middleware.extend(inner.middleware.iter().cloned());
        GroupAttributes {
            prefix: join_path(&self.prefix, &inner.prefix),
            middleware,
        }
    }
}

/// Router handle that applies group attributes to every route it adds
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    attributes: GroupAttributes,
}

impl<'r> RouteGroup<'r> {
    pub(crate) fn new(router: &'r mut Router, attributes: GroupAttributes) -> Self {
        Self { router, attributes }
    }

    pub fn attributes(&self) -> &GroupAttributes {
        &self.attributes
    }

    pub fn add(&mut self, route: Route) -> Result<()> {
        self.router.add_with(&self.attributes, route)
    }

    /// Nested group; prefixes and middleware accumulate
    pub fn group<F>(&mut self, attributes: GroupAttributes, build: F) -> Result<()>
    where
        F: FnOnce(&mut RouteGroup<'_>) -> Result<()>,
    {
        let merged = self.attributes.merge(&attributes);
        let mut nested = RouteGroup::new(&mut *self.router, merged);
        build(&mut nested)
    }
}

/// Join path fragments with single slashes, e.g. `/admin/` + `/users` → `/admin/users`
pub(crate) fn join_path(prefix: &str, path: &str) -> String {
    let joined: Vec<&str> = [prefix, path]
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect();
    format!("/{}", joined.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "/"), "/");
        assert_eq!(join_path("/admin/", "/users"), "/admin/users");
        assert_eq!(join_path("/admin", "/"), "/admin");
        assert_eq!(join_path("", "users/{id}/"), "/users/{id}");
    }

    #[test]
    fn test_merge_accumulates() {
        let outer = GroupAttributes::new().prefix("/admin").middleware("auth");
        let inner = GroupAttributes::new().prefix("/reports").middleware("audit");
        let merged = outer.merge(&inner);

        assert_eq!(merged.prefix, "/admin/reports");
        let names: Vec<&str> = merged.middleware.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["auth", "audit"]);
        assert_eq!(outer.prefix, "/admin");
        assert_eq!(outer.middleware.len(), 1);
    }
}

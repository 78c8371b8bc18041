use super::RouteHandler;
use std::collections::HashMap;
use thiserror::Error;

/// Why an action descriptor could not be turned into a handler
///
/// These are reported to the client as 500 responses whose body is the
/// `Display` text, not as framework errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Handler not valid.")]
    InvalidHandler,

    #[error("Controller '{0}' not found.")]
    ControllerNotFound(String),

    #[error("Action '{action}' not found in '{controller}'.")]
    ActionNotFound { controller: String, action: String },
}

/// Named set of action handlers
#[derive(Clone)]
pub struct Controller {
    name: String,
    actions: HashMap<String, RouteHandler>,
}

impl Controller {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_controller(name),
            actions: HashMap::new(),
        }
    }

    pub fn action(mut self, name: &str, handler: RouteHandler) -> Self {
        self.actions.insert(name.to_string(), handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_action(&self, name: &str) -> Option<RouteHandler> {
        self.actions.get(name).copied()
    }

    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Controllers addressable from `Controller#action` route descriptors
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Controller>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, controller: Controller) {
        log::debug!(
            "Registered controller '{}' with actions {:?}",
            controller.name,
            controller.action_names()
        );
        self.controllers.insert(controller.name.clone(), controller);
    }

    pub fn get(&self, name: &str) -> Option<&Controller> {
        self.controllers.get(&normalize_controller(name))
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Resolve `Controller#action` (or `Controller@action`) to its handler
    pub fn resolve(&self, descriptor: &str) -> Result<RouteHandler, ActionError> {
        let (controller, action) = split_descriptor(descriptor).ok_or(ActionError::InvalidHandler)?;
        let controller_name = normalize_controller(controller);

        let found = self
            .controllers
            .get(&controller_name)
            .ok_or_else(|| ActionError::ControllerNotFound(controller_name.clone()))?;

        found
            .get_action(action)
            .ok_or_else(|| ActionError::ActionNotFound {
                controller: controller_name,
                action: action.to_string(),
            })
    }
}

fn split_descriptor(descriptor: &str) -> Option<(&str, &str)> {
    let index = descriptor.find(['#', '@'])?;
    let (controller, action) = (descriptor[..index].trim(), descriptor[index + 1..].trim());
    if controller.is_empty() || action.is_empty() {
        return None;
    }
    Some((controller, action))
}

/// `Admin\Users` and `Admin/Users` name the same controller
fn normalize_controller(name: &str) -> String {
    name.trim().replace('\\', "/").trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::Result;
    use futures::future::BoxFuture;

    fn show(_ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn registry() -> ControllerRegistry {
        let mut registry = ControllerRegistry::new();
        registry.register(Controller::new("Admin\\Users").action("show", show));
        registry
    }

    #[test]
    fn test_resolve_both_delimiters() {
        let registry = registry();
        assert!(registry.resolve("Admin/Users#show").is_ok());
        assert!(registry.resolve("Admin\\Users@show").is_ok());
        assert!(registry.get("Admin/Users").is_some());
    }

    #[test]
    fn test_resolution_errors() {
        let registry = registry();
        assert!(matches!(registry.resolve("nonsense"), Err(ActionError::InvalidHandler)));
        assert!(matches!(registry.resolve("#show"), Err(ActionError::InvalidHandler)));
        assert_eq!(
            registry.resolve("Blog#index").err().unwrap().to_string(),
            "Controller 'Blog' not found."
        );
        assert_eq!(
            registry.resolve("Admin/Users#edit").err().unwrap().to_string(),
            "Action 'edit' not found in 'Admin/Users'."
        );
    }
}

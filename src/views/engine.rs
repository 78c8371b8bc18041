use super::ast::Template;
use super::cache::{CacheStats, CompiledCache};
use super::functions::FunctionRegistry;
use super::parser;
use super::renderer::{forwarded_scope, RenderContext, RenderState, Renderer};
use super::resolver::ViewResolver;
use crate::config::ViewConfig;
use crate::error::pages::missing_view_fragment;
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Deepest `@extends` chain a single render may follow
const MAX_LAYOUT_DEPTH: usize = 32;

const DEFAULT_MAX_LOOP_ITERATIONS: usize = 10_000;

/// Squehub view engine
///
/// Resolves logical view names, compiles templates through the on-disk cache
/// and renders them with layout composition. All render state lives in the
/// call, so one engine can serve concurrent requests.
pub struct ViewEngine {
    resolver: ViewResolver,
    cache: CompiledCache,
    functions: FunctionRegistry,
    max_loop_iterations: usize,
}

impl ViewEngine {
    /// Engine over a single view directory with caching disabled
    pub fn new<P: AsRef<Path>>(views_dir: P) -> Self {
        Self {
            resolver: ViewResolver::single(views_dir),
            cache: CompiledCache::disabled(),
            functions: FunctionRegistry::new(),
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
        }
    }

    pub fn with_config(config: &ViewConfig) -> Self {
        let cache = if config.cache_enabled {
            CompiledCache::new(&config.cache_directory)
        } else {
            CompiledCache::disabled()
        };

        log::debug!(
            "View engine: root '{}', extension '.{}', cache {}",
            config.directory,
            config.extension,
            if config.cache_enabled {
                config.cache_directory.as_str()
            } else {
                "disabled"
            }
        );

        Self {
            resolver: ViewResolver::from_config(config),
            cache,
            functions: FunctionRegistry::new(),
            max_loop_iterations: config.max_loop_iterations,
        }
    }

    /// Persist compiled views under `directory`
    pub fn with_cache_directory<P: Into<PathBuf>>(mut self, directory: P) -> Self {
        self.cache = CompiledCache::new(directory);
        self
    }

    pub fn with_max_loop_iterations(mut self, limit: usize) -> Self {
        self.max_loop_iterations = limit;
        self
    }

    /// Register a function callable from templates
    pub fn register_function<F>(&self, name: &str, function: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.functions.register(name, function);
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn max_loop_iterations(&self) -> usize {
        self.max_loop_iterations
    }

    pub fn resolver(&self) -> &ViewResolver {
        &self.resolver
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolver.exists(name)
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        self.resolver.resolve(name)
    }

    pub fn expected_path(&self, name: &str) -> PathBuf {
        self.resolver.expected_path(name)
    }

    /// Compiled tree for a named view
    pub fn load(&self, name: &str) -> Result<Template> {
        let path = self.resolver.resolve(name)?;
        self.cache.load_or_compile(name, &path)
    }

    /// Render a view without request context
    pub fn render(&self, name: &str, data: &Value) -> Result<String> {
        self.render_with(name, data, &RenderContext::default())
    }

    /// Render a view, following `@extends` up to the outermost layout
    ///
    /// A missing top-level view renders an inline error fragment instead of
    /// failing; missing layouts and partials are errors.
    pub fn render_with(&self, name: &str, data: &Value, context: &RenderContext) -> Result<String> {
        let template = match self.load(name) {
            Ok(template) => template,
            Err(Error::ViewNotFound(_)) => {
                let path = self.expected_path(name);
                log::warn!("View '{}' not found at {}", name, path.display());
                return Ok(missing_view_fragment(&path.display().to_string()));
            }
            Err(e) => return Err(e),
        };

        self.compose(template, scope_from(data)?, context)
    }

    /// Render template source directly; nothing is cached
    pub fn render_inline(&self, source: &str, data: &Value, context: &RenderContext) -> Result<String> {
        let template = parser::compile(source)?;
        self.compose(template, scope_from(data)?, context)
    }

    /// Render a partial as a leaf: `@extends` is ignored and missing views fail
    pub fn include(&self, name: &str, data: &Value, context: &RenderContext) -> Result<String> {
        let template = self.load(name).map_err(|e| match e {
            Error::ViewNotFound(_) => Error::template(format!(
                "Included view file '{}' not found.",
                self.expected_path(name).display()
            )),
            other => other,
        })?;

        let mut state = RenderState::new();
        let mut out = String::new();
        Renderer::new(self, context, &mut state, scope_from(data)?)
            .as_include()
            .render(&template.nodes, &mut out)?;
        Ok(state.resolve_yields(out))
    }

    fn compose(
        &self,
        template: Template,
        scope: Map<String, Value>,
        context: &RenderContext,
    ) -> Result<String> {
        let mut state = RenderState::new();
        let base = scope.clone();
        let mut template = template;
        let mut scope = scope;
        let mut depth = 0;

        loop {
            let mut out = String::with_capacity(template.nodes.len() * 64);
            let final_scope =
                Renderer::new(self, context, &mut state, scope).render(&template.nodes, &mut out)?;

            let layout = match state.take_pending_layout() {
                Some(layout) => layout,
                None => return Ok(state.resolve_yields(out)),
            };

            depth += 1;
            if depth > MAX_LAYOUT_DEPTH {
                return Err(Error::template(format!(
                    "Layout nesting deeper than {} levels at '{}'",
                    MAX_LAYOUT_DEPTH, layout.name
                )));
            }
            log::trace!("Rendering layout '{}'", layout.name);

            state.set_content(out);

            let mut next = base.clone();
            next.extend(layout.vars.unwrap_or_else(|| forwarded_scope(&final_scope)));
            scope = next;

            template = self.load(&layout.name).map_err(|e| match e {
                Error::ViewNotFound(_) => Error::template(format!(
                    "Extended view file '{}' not found.",
                    self.expected_path(&layout.name).display()
                )),
                other => other,
            })?;
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Delete compiled artifacts; returns how many were removed
    pub fn clear_cache(&self) -> Result<usize> {
        self.cache.clear()
    }
}

fn scope_from(data: &Value) -> Result<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(Error::template(format!(
            "View data must be an object, got {}",
            match other {
                Value::Array(_) => "an array",
                Value::String(_) => "a string",
                Value::Number(_) => "a number",
                _ => "a boolean",
            }
        ))),
    }
}

use super::ast::{
    Accessor, BinaryOperator, DateDirective, Expression, Node, Statement, Target,
    UnaryOperator,
};
use super::datetime;
use super::engine::ViewEngine;
use super::functions;
use super::value;
use crate::error::{Error, Result};
use crate::routing::NamedRoutes;
use crate::security::csrf;
use crate::security::HtmlEscaper;
use crate::session::Session;
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Variables never forwarded implicitly by `@extends` and `@include`
pub const RESERVED_VARIABLES: &[&str] = &[
    "content",
    "parsedContent",
    "data",
    "view",
    "__data",
    "cacheFile",
    "viewFilePath",
];

const MAX_INCLUDE_DEPTH: usize = 64;
const MAX_YIELD_PASSES: usize = 32;
const YIELD_MARKER: char = '\u{1A}';

/// Request-scoped collaborators available to templates
#[derive(Clone, Default)]
pub struct RenderContext {
    /// Session for `@csrf`, `@notification` and `session()`
    pub session: Option<Arc<Session>>,
    /// Named routes for `route()`
    pub routes: Option<Arc<NamedRoutes>>,
    /// Clock override for the date directives; defaults to the current time
    pub now: Option<DateTime<FixedOffset>>,
    /// Scheme and host prefixed by `url()`, e.g. `http://localhost:8000`
    pub base_url: Option<String>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_routes(mut self, routes: Arc<NamedRoutes>) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Layout requested by `@extends`, consumed by the engine's render loop
#[derive(Debug, Clone)]
pub struct PendingLayout {
    pub name: String,
    /// Explicit variables; `None` forwards the template's final scope
    pub vars: Option<Map<String, Value>>,
}

/// Section and layout state for one top-level render call
#[derive(Debug, Default)]
pub struct RenderState {
    sections: HashMap<String, String>,
    /// Sections defined by a more derived view; later captures are dropped
    locked: HashSet<String>,
    section_stack: Vec<String>,
    pending_layout: Option<PendingLayout>,
    /// Deferred `@yield`s: section name and default
    yields: Vec<(String, String)>,
    include_depth: usize,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(String::as_str)
    }

    pub fn begin_section(&mut self, name: &str) {
        self.section_stack.push(name.to_string());
    }

    pub fn end_section(&mut self, content: String) -> Result<()> {
        let name = self
            .section_stack
            .pop()
            .ok_or_else(|| Error::template("Cannot end a section without a matching @section"))?;
        if self.locked.contains(&name) {
            log::trace!("Section '{}' already defined by a child view", name);
        } else {
            self.sections.insert(name, content);
        }
        Ok(())
    }

    /// Install the rendered child as `content` and freeze the child's sections
    pub fn set_content(&mut self, content: String) {
        self.locked.extend(self.sections.keys().cloned());
        self.sections.insert("content".to_string(), content);
        self.locked.insert("content".to_string());
    }

    pub fn take_pending_layout(&mut self) -> Option<PendingLayout> {
        self.pending_layout.take()
    }

    fn placeholder(&mut self, name: String, default: String) -> String {
        self.yields.push((name, default.replace(YIELD_MARKER, "")));
        format!(
            "{}squehub-yield-{}{}",
            YIELD_MARKER,
            self.yields.len() - 1,
            YIELD_MARKER
        )
    }

    /// Replace deferred `@yield` placeholders with final section content
    pub fn resolve_yields(&self, mut output: String) -> String {
        for _ in 0..MAX_YIELD_PASSES {
            if !output.contains(YIELD_MARKER) {
                break;
            }
            output = self.replace_placeholders(&output);
        }
        output
    }

    fn replace_placeholders(&self, input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut rest = input;
        let prefix = format!("{}squehub-yield-", YIELD_MARKER);

        while let Some(start) = rest.find(&prefix) {
            result.push_str(&rest[..start]);
            let after = &rest[start + prefix.len()..];
            let end = match after.find(YIELD_MARKER) {
                Some(end) => end,
                None => {
                    result.push_str(&rest[start..]);
                    return result;
                }
            };
            match after[..end].parse::<usize>().ok().and_then(|i| self.yields.get(i)) {
                Some((name, default)) => match self.sections.get(name) {
                    Some(content) => result.push_str(content),
                    None => result.push_str(default),
                },
                None => result.push_str(&rest[start..start + prefix.len() + end + 1]),
            }
            rest = &after[end + YIELD_MARKER.len_utf8()..];
        }
        result.push_str(rest);
        result
    }
}

/// Append template output; the yield marker only ever comes from placeholders
fn emit(out: &mut String, text: &str) {
    if text.contains(YIELD_MARKER) {
        out.extend(text.chars().filter(|c| *c != YIELD_MARKER));
    } else {
        out.push_str(text);
    }
}

/// Outcome of rendering a node list inside a loop body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Evaluates a compiled template against a variable scope
pub struct Renderer<'a> {
    engine: &'a ViewEngine,
    context: &'a RenderContext,
    state: &'a mut RenderState,
    scope: Map<String, Value>,
    is_include: bool,
}

impl<'a> Renderer<'a> {
    pub fn new(
        engine: &'a ViewEngine,
        context: &'a RenderContext,
        state: &'a mut RenderState,
        scope: Map<String, Value>,
    ) -> Self {
        Self {
            engine,
            context,
            state,
            scope,
            is_include: false,
        }
    }

    /// Treat the template as a partial: `@extends` inside it is ignored
    pub fn as_include(mut self) -> Self {
        self.is_include = true;
        self
    }

    /// Render `nodes` into `out`, returning the final variable scope
    pub fn render(mut self, nodes: &[Node], out: &mut String) -> Result<Map<String, Value>> {
        self.render_nodes(nodes, out)?;
        Ok(self.scope)
    }

    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> Result<Flow> {
        for node in nodes {
            let flow = self.render_node(node, out)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn render_node(&mut self, node: &Node, out: &mut String) -> Result<Flow> {
        match node {
            Node::Text(text) => emit(out, text),

            Node::Echo { expr, escape } => {
                let text = value::to_display(&self.evaluate(expr)?);
                if *escape {
                    emit(out, &HtmlEscaper::escape(&text));
                } else {
                    emit(out, &text);
                }
            }

            Node::Php(statements) => {
                for statement in statements {
                    self.execute(statement, out)?;
                }
            }

            Node::Conditional {
                condition,
                then_branch,
                else_if_branches,
                else_branch,
            } => {
                if value::is_truthy(&self.evaluate(condition)?) {
                    return self.render_nodes(then_branch, out);
                }
                for (condition, branch) in else_if_branches {
                    if value::is_truthy(&self.evaluate(condition)?) {
                        return self.render_nodes(branch, out);
                    }
                }
                if let Some(branch) = else_branch {
                    return self.render_nodes(branch, out);
                }
            }

            Node::Foreach {
                collection,
                key,
                value,
                body,
            } => self.render_foreach(collection, key.as_deref(), value, body, out)?,

            Node::For {
                init,
                condition,
                step,
                body,
            } => {
                for statement in init {
                    self.execute(statement, out)?;
                }
                let mut iterations = 0;
                loop {
                    if let Some(condition) = condition {
                        if !value::is_truthy(&self.evaluate(condition)?) {
                            break;
                        }
                    }
                    self.guard_iterations(&mut iterations)?;
                    if self.render_nodes(body, out)? == Flow::Break {
                        break;
                    }
                    for statement in step {
                        self.execute(statement, out)?;
                    }
                }
            }

            Node::While { condition, body } => {
                let mut iterations = 0;
                while value::is_truthy(&self.evaluate(condition)?) {
                    self.guard_iterations(&mut iterations)?;
                    if self.render_nodes(body, out)? == Flow::Break {
                        break;
                    }
                }
            }

            Node::DoWhile { body, condition } => {
                let mut iterations = 0;
                loop {
                    self.guard_iterations(&mut iterations)?;
                    if self.render_nodes(body, out)? == Flow::Break {
                        break;
                    }
                    if !value::is_truthy(&self.evaluate(condition)?) {
                        break;
                    }
                }
            }

            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),

            Node::Extends { name, vars } => self.extends(name, vars.as_ref())?,

            Node::Include { name, vars } => self.include(name, vars.as_ref(), out)?,

            Node::Section { name, body } => {
                let name = value::to_display(&self.evaluate(name)?);
                self.state.begin_section(&name);
                let mut captured = String::new();
                let flow = self.render_nodes(body, &mut captured);
                self.state.end_section(captured)?;
                return flow;
            }

            Node::Yield { name, default } => {
                let name = value::to_display(&self.evaluate(name)?);
                match self.state.section(&name) {
                    Some(content) => out.push_str(content),
                    None => {
                        let default = match default {
                            Some(expr) => value::to_display(&self.evaluate(expr)?),
                            None => String::new(),
                        };
                        let placeholder = self.state.placeholder(name, default);
                        out.push_str(&placeholder);
                    }
                }
            }

            Node::Notification { kind } => {
                let kind = value::to_display(&self.evaluate(kind)?);
                if let Some(message) = self.take_notification(&kind) {
                    let color = match kind.as_str() {
                        "success" => "green",
                        "error" => "red",
                        _ => "black",
                    };
                    emit(out, &format!(
                        "<p style=\"color: {}; \">{}</p>",
                        color,
                        HtmlEscaper::escape(&message)
                    ));
                }
            }

            Node::HasNotification { kind, body } => {
                let kind = value::to_display(&self.evaluate(kind)?);
                if let Some(message) = self.take_notification(&kind) {
                    let previous = self
                        .scope
                        .insert("message".to_string(), Value::String(message));
                    let flow = self.render_nodes(body, out);
                    match previous {
                        Some(previous) => self.scope.insert("message".to_string(), previous),
                        None => self.scope.remove("message"),
                    };
                    return flow;
                }
            }

            Node::DateTime(directive) => {
                let pattern = match directive {
                    DateDirective::Custom(expr) => value::to_display(&self.evaluate(expr)?),
                    fixed => fixed.format().unwrap_or_default().to_string(),
                };
                let now = self.context.now.unwrap_or_else(datetime::now);
                emit(out, &datetime::format(&now, &pattern));
            }

            Node::Csrf => {
                let token = self.csrf_token()?;
                emit(out, &format!(
                    "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
                    csrf::TOKEN_KEY,
                    HtmlEscaper::escape_attribute(&token)
                ));
            }
        }

        Ok(Flow::Normal)
    }

    fn render_foreach(
        &mut self,
        collection: &Expression,
        key_var: Option<&str>,
        value_var: &str,
        body: &[Node],
        out: &mut String,
    ) -> Result<()> {
        let entries: Vec<(Value, Value)> = match self.evaluate(collection)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, item)| (Value::String(k), item))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                log::warn!(
                    "@foreach over a non-iterable value ({}), skipping",
                    value::to_display(&other)
                );
                Vec::new()
            }
        };

        for (key, item) in entries {
            if let Some(key_var) = key_var {
                self.scope.insert(key_var.to_string(), key);
            }
            self.scope.insert(value_var.to_string(), item);
            if self.render_nodes(body, out)? == Flow::Break {
                break;
            }
        }
        Ok(())
    }

    fn guard_iterations(&self, iterations: &mut usize) -> Result<()> {
        *iterations += 1;
        let limit = self.engine.max_loop_iterations();
        if *iterations > limit {
            return Err(Error::template(format!(
                "Loop exceeded the maximum of {} iterations",
                limit
            )));
        }
        Ok(())
    }

    fn explicit_vars(&mut self, directive: &str, vars: Option<&Expression>) -> Result<Option<Map<String, Value>>> {
        let expr = match vars {
            Some(expr) => expr,
            None => return Ok(None),
        };
        match self.evaluate(expr)? {
            Value::Object(map) => Ok(Some(map)),
            Value::Array(items) if items.is_empty() => Ok(Some(Map::new())),
            Value::Null => Ok(None),
            other => Err(Error::template(format!(
                "@{} expects an array of variables, got '{}'",
                directive,
                value::to_display(&other)
            ))),
        }
    }

    fn extends(&mut self, name: &Expression, vars: Option<&Expression>) -> Result<()> {
        let name = value::to_display(&self.evaluate(name)?);
        if self.is_include {
            log::warn!("Ignoring @extends('{}') inside an included view", name);
            return Ok(());
        }
        if !self.engine.exists(&name) {
            return Err(Error::template(format!(
                "Extended view file '{}' not found.",
                self.engine.expected_path(&name).display()
            )));
        }
        let vars = self.explicit_vars("extends", vars)?;
        self.state.pending_layout = Some(PendingLayout { name, vars });
        Ok(())
    }

    fn include(&mut self, name: &Expression, vars: Option<&Expression>, out: &mut String) -> Result<()> {
        let name = value::to_display(&self.evaluate(name)?);
        let scope = match self.explicit_vars("include", vars)? {
            Some(vars) => vars,
            None => forwarded_scope(&self.scope),
        };

        if self.state.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(Error::template(format!(
                "Include depth limit reached while including '{}'",
                name
            )));
        }

        let template = match self.engine.load(&name) {
            Ok(template) => template,
            Err(Error::ViewNotFound(_)) => {
                return Err(Error::template(format!(
                    "Included view file '{}' not found.",
                    self.engine.expected_path(&name).display()
                )))
            }
            Err(e) => return Err(e),
        };

        self.state.include_depth += 1;
        let mut child = Renderer {
            engine: self.engine,
            context: self.context,
            state: &mut *self.state,
            scope,
            is_include: true,
        };
        let result = child.render_nodes(&template.nodes, out);
        self.state.include_depth -= 1;
        result.map(|_| ())
    }

    fn take_notification(&self, kind: &str) -> Option<String> {
        self.context
            .session
            .as_ref()
            .and_then(|session| session.take_notification(kind))
    }

    fn csrf_token(&self) -> Result<String> {
        match &self.context.session {
            Some(session) => csrf::ensure_token(session),
            None => {
                log::warn!("Rendering a CSRF token without a session; it cannot be verified");
                Ok(csrf::generate_token())
            }
        }
    }

    fn execute(&mut self, statement: &Statement, out: &mut String) -> Result<()> {
        match statement {
            Statement::Assign { target, op, value } => {
                let new_value = self.evaluate(value)?;
                let new_value = match op.binary() {
                    Some(binary) => {
                        let current = self.read_target(target)?;
                        self.apply_binary(binary, &current, &new_value)?
                    }
                    None => new_value,
                };
                self.write_target(target, new_value)
            }
            Statement::Increment { target, delta } => {
                let current = self.read_target(target)?;
                let next = value::arithmetic(BinaryOperator::Add, &current, &Value::from(*delta))?;
                self.write_target(target, next)
            }
            Statement::Echo(exprs) => {
                for expr in exprs {
                    emit(out, &value::to_display(&self.evaluate(expr)?));
                }
                Ok(())
            }
            Statement::Unset(targets) => {
                for target in targets {
                    self.unset_target(target)?;
                }
                Ok(())
            }
            Statement::Expr(expr) => self.evaluate(expr).map(|_| ()),
        }
    }

    fn resolve_keys(&mut self, path: &[Accessor]) -> Result<Vec<Key>> {
        path.iter()
            .map(|accessor| {
                Ok(match accessor {
                    Accessor::Index(expr) => Key::Index(self.evaluate(expr)?),
                    Accessor::Property(name) => Key::Index(Value::String(name.clone())),
                    Accessor::Push => Key::Push,
                })
            })
            .collect()
    }

    fn read_target(&mut self, target: &Target) -> Result<Value> {
        let keys = self.resolve_keys(&target.path)?;
        let mut current = self.scope.get(&target.name).cloned().unwrap_or(Value::Null);
        for key in keys {
            current = match key {
                Key::Index(key) => value::lookup(&current, &key),
                Key::Push => return Err(Error::template("Cannot use [] for reading")),
            };
        }
        Ok(current)
    }

    fn write_target(&mut self, target: &Target, new_value: Value) -> Result<()> {
        let keys = self.resolve_keys(&target.path)?;
        let mut slot = self.scope.entry(target.name.clone()).or_insert(Value::Null);
        for key in &keys {
            slot = child_slot(slot, key)?;
        }
        *slot = new_value;
        Ok(())
    }

    fn unset_target(&mut self, target: &Target) -> Result<()> {
        let mut keys = self.resolve_keys(&target.path)?;
        let last = match keys.pop() {
            Some(last) => last,
            None => {
                self.scope.remove(&target.name);
                return Ok(());
            }
        };

        let mut slot = match self.scope.get_mut(&target.name) {
            Some(slot) => slot,
            None => return Ok(()),
        };
        for key in &keys {
            slot = match key {
                Key::Index(key) => match slot {
                    Value::Object(map) => match map.get_mut(&value::to_display(key)) {
                        Some(next) => next,
                        None => return Ok(()),
                    },
                    Value::Array(items) => match value::index_of(key).and_then(|i| items.get_mut(i)) {
                        Some(next) => next,
                        None => return Ok(()),
                    },
                    _ => return Ok(()),
                },
                Key::Push => return Err(Error::template("Cannot use [] for unsetting")),
            };
        }

        if let Key::Index(key) = last {
            match slot {
                Value::Object(map) => {
                    map.shift_remove(&value::to_display(&key));
                }
                Value::Array(items) => {
                    if let Some(index) = value::index_of(&key).filter(|i| *i < items.len()) {
                        // Remaining entries keep their original keys
                        let map: Map<String, Value> = std::mem::take(items)
                            .into_iter()
                            .enumerate()
                            .filter(|(i, _)| *i != index)
                            .map(|(i, v)| (i.to_string(), v))
                            .collect();
                        *slot = Value::Object(map);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn evaluate(&mut self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::Null => Ok(Value::Null),
            Expression::Boolean(b) => Ok(Value::Bool(*b)),
            Expression::Integer(i) => Ok(Value::from(*i)),
            Expression::Float(f) => Ok(value::Number::Float(*f).into_value()),
            Expression::String(s) => Ok(Value::String(s.clone())),
            Expression::Variable(name) => Ok(self.scope.get(name).cloned().unwrap_or(Value::Null)),
            Expression::Property { object, name } => {
                let object = self.evaluate(object)?;
                Ok(value::lookup(&object, &Value::String(name.clone())))
            }
            Expression::Index { object, index } => {
                let object = self.evaluate(object)?;
                let index = self.evaluate(index)?;
                Ok(value::lookup(&object, &index))
            }
            Expression::Array(items) => {
                let mut entries = Vec::with_capacity(items.len());
                for (key, item) in items {
                    let key = match key {
                        Some(key) => Some(self.evaluate(key)?),
                        None => None,
                    };
                    entries.push((key, self.evaluate(item)?));
                }
                Ok(value::build_array(entries))
            }
            Expression::FunctionCall { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                self.call_function(name, &values)
            }
            Expression::Unary { op, operand } => {
                let operand = self.evaluate(operand)?;
                match op {
                    UnaryOperator::Not => Ok(Value::Bool(!value::is_truthy(&operand))),
                    UnaryOperator::Negate => {
                        value::arithmetic(BinaryOperator::Subtract, &Value::from(0), &operand)
                    }
                }
            }
            Expression::Binary { op, left, right } => match op {
                BinaryOperator::And => {
                    let left = value::is_truthy(&self.evaluate(left)?);
                    Ok(Value::Bool(left && value::is_truthy(&self.evaluate(right)?)))
                }
                BinaryOperator::Or => {
                    let left = value::is_truthy(&self.evaluate(left)?);
                    Ok(Value::Bool(left || value::is_truthy(&self.evaluate(right)?)))
                }
                BinaryOperator::Coalesce => match self.evaluate(left)? {
                    Value::Null => self.evaluate(right),
                    other => Ok(other),
                },
                _ => {
                    let left = self.evaluate(left)?;
                    let right = self.evaluate(right)?;
                    self.apply_binary(*op, &left, &right)
                }
            },
            Expression::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                let condition_value = self.evaluate(condition)?;
                if value::is_truthy(&condition_value) {
                    match then_expr {
                        Some(expr) => self.evaluate(expr),
                        None => Ok(condition_value),
                    }
                } else {
                    self.evaluate(else_expr)
                }
            }
        }
    }

    fn apply_binary(&self, op: BinaryOperator, left: &Value, right: &Value) -> Result<Value> {
        use std::cmp::Ordering;
        Ok(match op {
            BinaryOperator::Concat => {
                let mut text = value::to_display(left);
                text.push_str(&value::to_display(right));
                Value::String(text)
            }
            BinaryOperator::Equal => Value::Bool(value::loose_equals(left, right)),
            BinaryOperator::NotEqual => Value::Bool(!value::loose_equals(left, right)),
            BinaryOperator::Identical => Value::Bool(left == right),
            BinaryOperator::NotIdentical => Value::Bool(left != right),
            BinaryOperator::Less => Value::Bool(value::compare(left, right) == Ordering::Less),
            BinaryOperator::LessEqual => {
                Value::Bool(value::compare(left, right) != Ordering::Greater)
            }
            BinaryOperator::Greater => {
                Value::Bool(value::compare(left, right) == Ordering::Greater)
            }
            BinaryOperator::GreaterEqual => {
                Value::Bool(value::compare(left, right) != Ordering::Less)
            }
            BinaryOperator::And => Value::Bool(value::is_truthy(left) && value::is_truthy(right)),
            BinaryOperator::Or => Value::Bool(value::is_truthy(left) || value::is_truthy(right)),
            BinaryOperator::Coalesce => {
                if left.is_null() {
                    right.clone()
                } else {
                    left.clone()
                }
            }
            arithmetic => value::arithmetic(arithmetic, left, right)?,
        })
    }

    /// Framework helpers that need the request context, then registered functions
    fn call_function(&mut self, name: &str, args: &[Value]) -> Result<Value> {
        match name {
            "session" => {
                let session = match &self.context.session {
                    Some(session) => session,
                    None => return Ok(Value::Null),
                };
                Ok(match args.first() {
                    Some(key) => session
                        .get_value(&value::to_display(key))
                        .unwrap_or(Value::Null),
                    None => session.to_value(),
                })
            }
            "csrf_token" => Ok(Value::String(self.csrf_token()?)),
            "route" => {
                let route_name = args.first().map(value::to_display).unwrap_or_default();
                let params = match args.get(1) {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Map::new(),
                };
                Ok(Value::String(match &self.context.routes {
                    Some(routes) => routes.url(&route_name, &params),
                    None => "#".to_string(),
                }))
            }
            "url" => Ok(Value::String(functions::url_path(
                self.context.base_url.as_deref().unwrap_or_default(),
                args,
            ))),
            _ => self.engine.functions().call(name, args),
        }
    }
}

/// Variables forwarded when `@extends`/`@include` get no explicit data
pub fn forwarded_scope(scope: &Map<String, Value>) -> Map<String, Value> {
    scope
        .iter()
        .filter(|(k, _)| !RESERVED_VARIABLES.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Evaluated accessor used while writing through a target path
enum Key {
    Index(Value),
    Push,
}

/// Mutable child of `slot` for `key`, creating containers on the way
fn child_slot<'v>(slot: &'v mut Value, key: &Key) -> Result<&'v mut Value> {
    if slot.is_null() {
        let starts_list = match key {
            Key::Push => true,
            Key::Index(k) => value::index_of(k) == Some(0) && !matches!(k, Value::Bool(_)),
        };
        *slot = if starts_list {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
    }

    // Lists that receive a non-sequential key become maps keyed by position
    if let (Value::Array(items), Key::Index(k)) = (&*slot, key) {
        let fits = value::index_of(k).map_or(false, |i| i <= items.len());
        if !fits {
            if let Value::Array(items) = std::mem::take(slot) {
                *slot = Value::Object(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v))
                        .collect(),
                );
            }
        }
    }

    match slot {
        Value::Array(items) => {
            let index = match key {
                Key::Push => items.len(),
                Key::Index(k) => value::index_of(k).unwrap_or(items.len()),
            };
            if index == items.len() {
                items.push(Value::Null);
            }
            let last = items.len() - 1;
            Ok(&mut items[index.min(last)])
        }
        Value::Object(map) => {
            let name = match key {
                Key::Index(k) => value::to_display(k),
                Key::Push => map
                    .keys()
                    .filter_map(|k| k.parse::<i64>().ok())
                    .max()
                    .map_or(0, |max| max + 1)
                    .to_string(),
            };
            Ok(map.entry(name).or_insert(Value::Null))
        }
        other => Err(Error::template(format!(
            "Cannot use a scalar value ('{}') as an array",
            value::to_display(other)
        ))),
    }
}

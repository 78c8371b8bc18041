//! Squehub view layer
//!
//! Templates are Blade-style HTML files (`*.squehub.html`) addressed by dotted
//! logical names such as `users.profile`. Rendering happens in three steps:
//!
//! 1. [`lexer`] and [`parser`] compile template source into a [`Template`]
//!    tree. Embedded code is parsed by [`expression`] into a small,
//!    side-effect-free expression language; nothing is ever executed by a
//!    host interpreter.
//! 2. [`cache`] persists compiled trees as JSON files keyed by an MD5 of the
//!    view name and reuses them while the source file is unchanged.
//! 3. [`renderer`] evaluates the tree. Layout inheritance (`@extends`,
//!    `@section`, `@yield`) is driven by [`ViewEngine`] through a per-call
//!    [`RenderState`], so concurrent renders never share section data.
//!
//! ```rust,ignore
//! use squehub::views::ViewEngine;
//! use serde_json::json;
//!
//! let engine = ViewEngine::new("views");
//! let html = engine.render("home", &json!({"title": "Welcome"}))?;
//! ```

pub mod ast;
pub mod cache;
pub mod datetime;
pub mod engine;
pub mod expression;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod renderer;
pub mod resolver;
pub mod value;

pub use ast::{Node, Template};
pub use cache::{CacheStats, CompiledCache};
pub use engine::ViewEngine;
pub use functions::{FunctionRegistry, TemplateFunction};
pub use parser::compile;
pub use renderer::{RenderContext, RenderState, RESERVED_VARIABLES};
pub use resolver::ViewResolver;

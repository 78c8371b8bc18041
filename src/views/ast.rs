use serde::{Deserialize, Serialize};

/// Compiled template: text spans interleaved with directive nodes
///
/// Serializable so compiled output can be persisted by the view cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub nodes: Vec<Node>,
}

/// AST node types for Squehub templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Literal text, emitted untouched
    Text(String),

    /// `{{ expr }}` (escaped) or `@echo(expr)` (raw)
    Echo { expr: Expression, escape: bool },

    /// `@php ... @endphp`
    Php(Vec<Statement>),

    /// `@if` / `@elseif` / `@else` / `@endif`
    Conditional {
        condition: Expression,
        then_branch: Vec<Node>,
        else_if_branches: Vec<(Expression, Vec<Node>)>,
        else_branch: Option<Vec<Node>>,
    },

    /// `@foreach($items as $key => $value)`
    Foreach {
        collection: Expression,
        key: Option<String>,
        value: String,
        body: Vec<Node>,
    },

    /// `@for(init; condition; step)`
    For {
        init: Vec<Statement>,
        condition: Option<Expression>,
        step: Vec<Statement>,
        body: Vec<Node>,
    },

    /// `@while(condition)`
    While { condition: Expression, body: Vec<Node> },

    /// `@do ... @enddo(condition)`
    DoWhile { body: Vec<Node>, condition: Expression },

    Break,
    Continue,

    /// `@extends('layout', vars?)`
    Extends {
        name: Expression,
        vars: Option<Expression>,
    },

    /// `@include('partial', vars?)`
    Include {
        name: Expression,
        vars: Option<Expression>,
    },

    /// `@section('name') ... @endsection`
    Section { name: Expression, body: Vec<Node> },

    /// `@yield('name', 'default'?)`
    Yield {
        name: Expression,
        default: Option<Expression>,
    },

    /// `@notification('type')`
    Notification { kind: Expression },

    /// `@hasNotification('type') ... @endhasNotification`
    HasNotification { kind: Expression, body: Vec<Node> },

    /// `@year`, `@month`, `@date`, `@time`, `@datetime('format')`
    DateTime(DateDirective),

    /// `@csrf`
    Csrf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DateDirective {
    Year,
    Month,
    Date,
    Time,
    Custom(Expression),
}

impl DateDirective {
    /// Date format string for the fixed directives
    pub fn format(&self) -> Option<&'static str> {
        match self {
            DateDirective::Year => Some("Y"),
            DateDirective::Month => Some("F"),
            DateDirective::Date => Some("Y-m-d"),
            DateDirective::Time => Some("H:i:s"),
            DateDirective::Custom(_) => None,
        }
    }
}

/// Expression types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// `$name`
    Variable(String),
    /// `expr->name`
    Property {
        object: Box<Expression>,
        name: String,
    },
    /// `expr[index]`
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    /// `[a, 'k' => b]` or `array(...)`; entries without a key are appended
    Array(Vec<(Option<Expression>, Expression)>),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `cond ? a : b`; `then_expr` is `None` for the short form `cond ?: b`
    Ternary {
        condition: Box<Expression>,
        then_expr: Option<Box<Expression>>,
        else_expr: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concat,
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Negate,
}

/// Statements allowed inside `@php` blocks and `@for` clauses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Assign {
        target: Target,
        op: AssignOperator,
        value: Expression,
    },
    /// `$i++`, `++$i`, `$i--`, `--$i`
    Increment { target: Target, delta: i64 },
    /// `echo a, b;` writes raw output
    Echo(Vec<Expression>),
    Unset(Vec<Target>),
    /// Evaluated for side effects, result discarded
    Expr(Expression),
}

/// Assignable location: a variable followed by index/property accessors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub path: Vec<Accessor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Accessor {
    Index(Expression),
    Property(String),
    /// `[]` append
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOperator {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
    Concat,
}

impl AssignOperator {
    /// Binary operator applied by compound assignment
    pub fn binary(self) -> Option<BinaryOperator> {
        match self {
            AssignOperator::Set => None,
            AssignOperator::Add => Some(BinaryOperator::Add),
            AssignOperator::Subtract => Some(BinaryOperator::Subtract),
            AssignOperator::Multiply => Some(BinaryOperator::Multiply),
            AssignOperator::Divide => Some(BinaryOperator::Divide),
            AssignOperator::Concat => Some(BinaryOperator::Concat),
        }
    }
}

use super::ast::{DateDirective, Expression, Node, Template};
use super::expression;
use super::lexer::{Lexer, Token, TokenKind};
use crate::error::{Error, Result};

/// Closing or continuation directives that are only valid inside a block
const CLOSERS: &[&str] = &[
    "elseif",
    "else",
    "endif",
    "endforeach",
    "endfor",
    "endwhile",
    "enddo",
    "endsection",
    "endhasNotification",
    "endphp",
];

/// Recursive-descent parser turning template tokens into a directive tree
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    loop_depth: usize,
}

/// Directive that ended a nested block, with its arguments
struct Closer {
    name: String,
    args: Option<String>,
    line: usize,
    column: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
            loop_depth: 0,
        })
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    /// Parse the entire template
    pub fn parse(&mut self) -> Result<Template> {
        let (nodes, _) = self.parse_nodes(None, &[])?;
        Ok(Template { nodes })
    }

    /// Parse nodes until one of `terminators` (or end of input at the top level)
    fn parse_nodes(
        &mut self,
        opener: Option<(&str, usize, usize)>,
        terminators: &[&str],
    ) -> Result<(Vec<Node>, Option<Closer>)> {
        let mut nodes = Vec::new();

        loop {
            let token = match self.current() {
                Some(token) => token.clone(),
                None => break,
            };
            self.position += 1;

            match &token.kind {
                TokenKind::Eof => break,
                TokenKind::Text(text) => nodes.push(Node::Text(text.clone())),
                TokenKind::Echo { source, raw } => {
                    let expr = parse_at(source, &token, |s| expression::parse_expression(s))?;
                    nodes.push(Node::Echo { expr, escape: !raw });
                }
                TokenKind::Php(body) => {
                    let statements = parse_at(body, &token, |s| expression::parse_statements(s))?;
                    nodes.push(Node::Php(statements));
                }
                TokenKind::Directive { name, args } => {
                    if terminators.contains(&name.as_str()) {
                        return Ok((
                            nodes,
                            Some(Closer {
                                name: name.clone(),
                                args: args.clone(),
                                line: token.line,
                                column: token.column,
                            }),
                        ));
                    }
                    if CLOSERS.contains(&name.as_str()) {
                        return Err(Error::template(format!(
                            "Unexpected @{} at line {}, column {}",
                            name, token.line, token.column
                        )));
                    }
                    nodes.push(self.parse_directive(name, args.clone(), &token)?);
                }
            }
        }

        match opener {
            Some((name, line, column)) => Err(Error::template(format!(
                "Unclosed @{} opened at line {}, column {}",
                name, line, column
            ))),
            None => Ok((nodes, None)),
        }
    }

    fn parse_directive(&mut self, name: &str, args: Option<String>, token: &Token) -> Result<Node> {
        let args = args.unwrap_or_default();
        let opener = Some((name, token.line, token.column));

        let node = match name {
            "if" => self.parse_conditional(&args, token)?,

            "foreach" => {
                let (collection, key, value) =
                    parse_at(&args, token, |s| expression::parse_foreach(s))?;
                let body = self.parse_loop_body(opener, "endforeach")?;
                Node::Foreach {
                    collection,
                    key,
                    value,
                    body,
                }
            }

            "for" => {
                let (init, condition, step) = parse_at(&args, token, |s| expression::parse_for(s))?;
                let body = self.parse_loop_body(opener, "endfor")?;
                Node::For {
                    init,
                    condition,
                    step,
                    body,
                }
            }

            "while" => {
                let condition = parse_at(&args, token, |s| expression::parse_expression(s))?;
                let body = self.parse_loop_body(opener, "endwhile")?;
                Node::While { condition, body }
            }

            "do" => {
                self.loop_depth += 1;
                let result = self.parse_nodes(opener, &["enddo"]);
                self.loop_depth -= 1;
                let (body, closer) = result?;
                let closer = closer.ok_or_else(|| unclosed(name, token))?;
                let condition = parse_closer_args(&closer, |s| expression::parse_expression(s))?;
                Node::DoWhile { body, condition }
            }

            "break" | "continue" => {
                if self.loop_depth == 0 {
                    return Err(Error::template(format!(
                        "@{} outside of a loop at line {}, column {}",
                        name, token.line, token.column
                    )));
                }
                if name == "break" {
                    Node::Break
                } else {
                    Node::Continue
                }
            }

            "extends" | "include" => {
                let (view, vars) = parse_at(&args, token, |s| name_with_vars(name, s))?;
                if name == "extends" {
                    Node::Extends { name: view, vars }
                } else {
                    Node::Include { name: view, vars }
                }
            }

            "section" => {
                let section = parse_at(&args, token, |s| expression::parse_expression(s))?;
                let (body, _) = self.parse_nodes(opener, &["endsection"])?;
                Node::Section {
                    name: section,
                    body,
                }
            }

            "yield" => {
                let mut parsed = parse_at(&args, token, |s| expression::parse_arguments(s))?;
                if parsed.is_empty() || parsed.len() > 2 {
                    return Err(directive_error(
                        token,
                        "@yield expects a section name and an optional default",
                    ));
                }
                let default = if parsed.len() == 2 { parsed.pop() } else { None };
                let section = parsed.remove(0);
                Node::Yield {
                    name: section,
                    default,
                }
            }

            "notification" => Node::Notification {
                kind: parse_at(&args, token, |s| expression::parse_expression(s))?,
            },

            "hasNotification" => {
                let kind = parse_at(&args, token, |s| expression::parse_expression(s))?;
                let (body, _) = self.parse_nodes(opener, &["endhasNotification"])?;
                Node::HasNotification { kind, body }
            }

            "echo" => Node::Echo {
                expr: parse_at(&args, token, |s| expression::parse_expression(s))?,
                escape: false,
            },

            "year" => Node::DateTime(DateDirective::Year),
            "month" => Node::DateTime(DateDirective::Month),
            "date" => Node::DateTime(DateDirective::Date),
            "time" => Node::DateTime(DateDirective::Time),
            "datetime" => Node::DateTime(DateDirective::Custom(parse_at(&args, token, |s| {
                expression::parse_expression(s)
            })?)),

            "csrf" => Node::Csrf,

            other => {
                return Err(directive_error(
                    token,
                    &format!("Unsupported directive @{}", other),
                ))
            }
        };

        Ok(node)
    }

    fn parse_conditional(&mut self, args: &str, token: &Token) -> Result<Node> {
        let condition = parse_at(args, token, |s| expression::parse_expression(s))?;
        let opener = Some(("if", token.line, token.column));

        let (then_branch, mut closer) =
            self.parse_nodes(opener, &["elseif", "else", "endif"])?;
        let mut else_if_branches = Vec::new();
        let mut else_branch = None;

        while let Some(current) = closer.take() {
            match current.name.as_str() {
                "elseif" => {
                    let condition =
                        parse_closer_args(&current, |s| expression::parse_expression(s))?;
                    let (branch, next) =
                        self.parse_nodes(opener, &["elseif", "else", "endif"])?;
                    else_if_branches.push((condition, branch));
                    closer = next;
                }
                "else" => {
                    let (branch, next) = self.parse_nodes(opener, &["endif"])?;
                    else_branch = Some(branch);
                    closer = next;
                }
                _ => break,
            }
        }

        Ok(Node::Conditional {
            condition,
            then_branch,
            else_if_branches,
            else_branch,
        })
    }

    fn parse_loop_body(
        &mut self,
        opener: Option<(&str, usize, usize)>,
        terminator: &str,
    ) -> Result<Vec<Node>> {
        self.loop_depth += 1;
        let result = self.parse_nodes(opener, &[terminator]);
        self.loop_depth -= 1;
        Ok(result?.0)
    }
}

/// Run an expression parser and attach the directive position to failures
fn parse_at<T>(source: &str, token: &Token, parse: impl FnOnce(&str) -> Result<T>) -> Result<T> {
    parse(source).map_err(|e| directive_error(token, &e.to_string()))
}

fn parse_closer_args<T>(closer: &Closer, parse: impl FnOnce(&str) -> Result<T>) -> Result<T> {
    let source = closer.args.as_deref().unwrap_or_default();
    parse(source).map_err(|e| {
        Error::template(format!(
            "{} in @{} at line {}, column {}",
            e.to_string().trim_start_matches("Template error: "),
            closer.name, closer.line, closer.column
        ))
    })
}

fn directive_error(token: &Token, message: &str) -> Error {
    let what = match &token.kind {
        TokenKind::Directive { name, .. } => format!("@{}", name),
        TokenKind::Echo { .. } => "{{ }}".to_string(),
        TokenKind::Php(_) => "@php".to_string(),
        _ => "template".to_string(),
    };
    Error::template(format!(
        "{} in {} at line {}, column {}",
        message.trim_start_matches("Template error: "),
        what,
        token.line,
        token.column
    ))
}

fn unclosed(name: &str, token: &Token) -> Error {
    Error::template(format!(
        "Unclosed @{} opened at line {}, column {}",
        name, token.line, token.column
    ))
}

fn name_with_vars(directive: &str, source: &str) -> Result<(Expression, Option<Expression>)> {
    let mut args = expression::parse_arguments(source)?;
    match args.len() {
        1 => Ok((args.remove(0), None)),
        2 => {
            let vars = args.pop();
            Ok((args.remove(0), vars))
        }
        _ => Err(Error::template(format!(
            "@{} expects a view name and optional variables",
            directive
        ))),
    }
}

/// Compile template source into a directive tree
pub fn compile(source: &str) -> Result<Template> {
    Parser::new(source)?.parse()
}

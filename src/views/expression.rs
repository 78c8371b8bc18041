//! Tokenizer and Pratt parser for the template expression language
//!
//! The grammar is a safe subset of PHP expressions: variables, literals,
//! arrays, property and index access, function calls, arithmetic, string
//! concatenation, comparisons, logical operators, `??` and ternaries. The
//! statement form used by `@php` blocks and `@for` clauses adds assignment,
//! increments, `echo` and `unset`.

use crate::error::{Error, Result};
use crate::views::ast::{
    Accessor, AssignOperator, BinaryOperator, Expression, Statement, Target, UnaryOperator,
};

#[derive(Debug, Clone, PartialEq)]
enum StrPart {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Variable(String),
    Ident(String),
    Str(String),
    Interpolated(Vec<StrPart>),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Arrow,
    DoubleArrow,
    Question,
    Colon,
    Coalesce,
    Assign(AssignOperator),
    Increment,
    Decrement,
    Op(BinaryOperator),
    Not,
    Eof,
}

fn tokenize(source: &str) -> Result<Vec<Tok>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let at = |i: usize| chars.get(i).copied();

    while let Some(ch) = at(i) {
        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch == '$' {
            let name: String = chars[i + 1..]
                .iter()
                .take_while(|c| c.is_alphanumeric() || **c == '_')
                .collect();
            if name.is_empty() {
                return Err(Error::template("Expected variable name after '$'"));
            }
            i += 1 + name.chars().count();
            tokens.push(Tok::Variable(name));
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let name: String = chars[i..]
                .iter()
                .take_while(|c| c.is_alphanumeric() || **c == '_')
                .collect();
            i += name.chars().count();
            tokens.push(Tok::Ident(name));
            continue;
        }

        if ch.is_ascii_digit() {
            let start = i;
            while at(i).map_or(false, |c| c.is_ascii_digit()) {
                i += 1;
            }
            let is_float = at(i) == Some('.') && at(i + 1).map_or(false, |c| c.is_ascii_digit());
            if is_float {
                i += 1;
                while at(i).map_or(false, |c| c.is_ascii_digit()) {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            if is_float {
                let value = text
                    .parse::<f64>()
                    .map_err(|_| Error::template(format!("Invalid number '{}'", text)))?;
                tokens.push(Tok::Float(value));
            } else {
                match text.parse::<i64>() {
                    Ok(value) => tokens.push(Tok::Int(value)),
                    Err(_) => {
                        let value = text
                            .parse::<f64>()
                            .map_err(|_| Error::template(format!("Invalid number '{}'", text)))?;
                        tokens.push(Tok::Float(value));
                    }
                }
            }
            continue;
        }

        if ch == '\'' {
            let (value, next) = read_single_quoted(&chars, i)?;
            tokens.push(Tok::Str(value));
            i = next;
            continue;
        }

        if ch == '"' {
            let (parts, next) = read_double_quoted(&chars, i)?;
            i = next;
            match parts.as_slice() {
                [] => tokens.push(Tok::Str(String::new())),
                [StrPart::Literal(text)] => tokens.push(Tok::Str(text.clone())),
                _ => tokens.push(Tok::Interpolated(parts)),
            }
            continue;
        }

        let next = at(i + 1);
        let next2 = at(i + 2);
        let (token, width) = match (ch, next) {
            ('(', _) => (Tok::LParen, 1),
            (')', _) => (Tok::RParen, 1),
            ('[', _) => (Tok::LBracket, 1),
            (']', _) => (Tok::RBracket, 1),
            (',', _) => (Tok::Comma, 1),
            (';', _) => (Tok::Semicolon, 1),
            (':', _) => (Tok::Colon, 1),
            ('?', Some('?')) => (Tok::Coalesce, 2),
            ('?', _) => (Tok::Question, 1),
            ('+', Some('+')) => (Tok::Increment, 2),
            ('+', Some('=')) => (Tok::Assign(AssignOperator::Add), 2),
            ('+', _) => (Tok::Op(BinaryOperator::Add), 1),
            ('-', Some('-')) => (Tok::Decrement, 2),
            ('-', Some('=')) => (Tok::Assign(AssignOperator::Subtract), 2),
            ('-', Some('>')) => (Tok::Arrow, 2),
            ('-', _) => (Tok::Op(BinaryOperator::Subtract), 1),
            ('*', Some('=')) => (Tok::Assign(AssignOperator::Multiply), 2),
            ('*', _) => (Tok::Op(BinaryOperator::Multiply), 1),
            ('/', Some('=')) => (Tok::Assign(AssignOperator::Divide), 2),
            ('/', _) => (Tok::Op(BinaryOperator::Divide), 1),
            ('%', _) => (Tok::Op(BinaryOperator::Modulo), 1),
            ('.', Some('=')) => (Tok::Assign(AssignOperator::Concat), 2),
            ('.', _) => (Tok::Op(BinaryOperator::Concat), 1),
            ('=', Some('=')) if next2 == Some('=') => (Tok::Op(BinaryOperator::Identical), 3),
            ('=', Some('=')) => (Tok::Op(BinaryOperator::Equal), 2),
            ('=', Some('>')) => (Tok::DoubleArrow, 2),
            ('=', _) => (Tok::Assign(AssignOperator::Set), 1),
            ('!', Some('=')) if next2 == Some('=') => (Tok::Op(BinaryOperator::NotIdentical), 3),
            ('!', Some('=')) => (Tok::Op(BinaryOperator::NotEqual), 2),
            ('!', _) => (Tok::Not, 1),
            ('<', Some('=')) => (Tok::Op(BinaryOperator::LessEqual), 2),
            ('<', Some('>')) => (Tok::Op(BinaryOperator::NotEqual), 2),
            ('<', _) => (Tok::Op(BinaryOperator::Less), 1),
            ('>', Some('=')) => (Tok::Op(BinaryOperator::GreaterEqual), 2),
            ('>', _) => (Tok::Op(BinaryOperator::Greater), 1),
            ('&', Some('&')) => (Tok::Op(BinaryOperator::And), 2),
            ('|', Some('|')) => (Tok::Op(BinaryOperator::Or), 2),
            _ => return Err(Error::template(format!("Unexpected character '{}'", ch))),
        };
        tokens.push(token);
        i += width;
    }

    tokens.push(Tok::Eof);
    Ok(tokens)
}

fn read_single_quoted(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut value = String::new();
    let mut i = start + 1;
    while let Some(&ch) = chars.get(i) {
        match ch {
            '\\' if matches!(chars.get(i + 1), Some('\'') | Some('\\')) => {
                value.push(chars[i + 1]);
                i += 2;
            }
            '\'' => return Ok((value, i + 1)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(Error::template("Unterminated string literal"))
}

/// Double-quoted strings support escapes and `$name` / `{$name}` interpolation
fn read_double_quoted(chars: &[char], start: usize) -> Result<(Vec<StrPart>, usize)> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = start + 1;

    let read_name = |from: usize| -> String {
        chars[from..]
            .iter()
            .take_while(|c| c.is_alphanumeric() || **c == '_')
            .collect()
    };

    while let Some(&ch) = chars.get(i) {
        match ch {
            '\\' => {
                let escaped = chars.get(i + 1).copied();
                match escaped {
                    Some('n') => literal.push('\n'),
                    Some('t') => literal.push('\t'),
                    Some('r') => literal.push('\r'),
                    Some('\\') => literal.push('\\'),
                    Some('"') => literal.push('"'),
                    Some('$') => literal.push('$'),
                    Some(other) => {
                        literal.push('\\');
                        literal.push(other);
                    }
                    None => return Err(Error::template("Unterminated string literal")),
                }
                i += 2;
            }
            '"' => {
                if !literal.is_empty() {
                    parts.push(StrPart::Literal(literal));
                }
                return Ok((parts, i + 1));
            }
            '$' | '{' => {
                let braced = ch == '{' && chars.get(i + 1) == Some(&'$');
                let name_start = if braced { i + 2 } else { i + 1 };
                let name = read_name(name_start);
                let closes = !braced || chars.get(name_start + name.chars().count()) == Some(&'}');
                if (ch == '$' || braced) && !name.is_empty() && closes {
                    if !literal.is_empty() {
                        parts.push(StrPart::Literal(std::mem::take(&mut literal)));
                    }
                    i = name_start + name.chars().count() + usize::from(braced);
                    parts.push(StrPart::Variable(name));
                } else {
                    literal.push(ch);
                    i += 1;
                }
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    Err(Error::template("Unterminated string literal"))
}

/// Binding power of the unary operators
const PREFIX_BP: u8 = 23;
const TERNARY_BP: u8 = 5;

/// Recursive descent parser over expression tokens
pub struct ExpressionParser {
    tokens: Vec<Tok>,
    position: usize,
}

impl ExpressionParser {
    pub fn new(source: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            position: 0,
        })
    }

    fn from_tokens(mut tokens: Vec<Tok>) -> Self {
        if tokens.last() != Some(&Tok::Eof) {
            tokens.push(Tok::Eof);
        }
        Self {
            tokens,
            position: 0,
        }
    }

    fn peek(&self) -> &Tok {
        self.tokens.get(self.position).unwrap_or(&Tok::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens.get(self.position + offset).unwrap_or(&Tok::Eof)
    }

    fn advance(&mut self) -> Tok {
        let token = self.peek().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: Tok, what: &str) -> Result<()> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(Error::template(format!(
                "Expected {} but found {:?}",
                what,
                self.peek()
            )))
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Tok::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }

    /// Fail unless every token was consumed
    pub fn expect_end(&self) -> Result<()> {
        match self.peek() {
            Tok::Eof => Ok(()),
            other => Err(Error::template(format!("Unexpected {:?}", other))),
        }
    }

    pub fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_bp(0)
    }

    fn parse_bp(&mut self, min_bp: u8) -> Result<Expression> {
        let mut lhs = self.parse_prefix()?;

        loop {
            if *self.peek() == Tok::Question {
                if TERNARY_BP < min_bp {
                    break;
                }
                self.advance();
                let then_expr = if *self.peek() == Tok::Colon {
                    None
                } else {
                    Some(Box::new(self.parse_bp(0)?))
                };
                self.expect(Tok::Colon, "':' in ternary expression")?;
                let else_expr = self.parse_bp(TERNARY_BP)?;
                lhs = Expression::Ternary {
                    condition: Box::new(lhs),
                    then_expr,
                    else_expr: Box::new(else_expr),
                };
                continue;
            }

            let (op, l_bp, r_bp) = match self.infix_operator() {
                Some(binding) => binding,
                None => break,
            };
            if l_bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_bp(r_bp)?;
            lhs = Expression::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn infix_operator(&self) -> Option<(BinaryOperator, u8, u8)> {
        use BinaryOperator::*;
        match self.peek() {
            Tok::Ident(word) if word.eq_ignore_ascii_case("or") => Some((Or, 1, 2)),
            Tok::Ident(word) if word.eq_ignore_ascii_case("and") => Some((And, 3, 4)),
            Tok::Coalesce => Some((Coalesce, 7, 7)),
            Tok::Op(op) => {
                let (l, r) = match op {
                    Or => (9, 10),
                    And => (11, 12),
                    Equal | NotEqual | Identical | NotIdentical => (13, 14),
                    Less | LessEqual | Greater | GreaterEqual => (15, 16),
                    Concat => (17, 18),
                    Add | Subtract => (19, 20),
                    Multiply | Divide | Modulo => (21, 22),
                    Coalesce => (7, 7),
                };
                Some((*op, l, r))
            }
            _ => None,
        }
    }

    fn parse_prefix(&mut self) -> Result<Expression> {
        let token = self.advance();
        let primary = match token {
            Tok::Not => {
                let operand = self.parse_bp(PREFIX_BP)?;
                return Ok(Expression::Unary {
                    op: UnaryOperator::Not,
                    operand: Box::new(operand),
                });
            }
            Tok::Op(BinaryOperator::Subtract) => {
                let operand = self.parse_bp(PREFIX_BP)?;
                return Ok(match operand {
                    Expression::Integer(n) => Expression::Integer(-n),
                    Expression::Float(f) => Expression::Float(-f),
                    other => Expression::Unary {
                        op: UnaryOperator::Negate,
                        operand: Box::new(other),
                    },
                });
            }
            Tok::Op(BinaryOperator::Add) => return self.parse_bp(PREFIX_BP),
            Tok::Int(n) => Expression::Integer(n),
            Tok::Float(f) => Expression::Float(f),
            Tok::Str(s) => Expression::String(s),
            Tok::Interpolated(parts) => interpolate(parts),
            Tok::Variable(name) => Expression::Variable(name),
            Tok::LParen => {
                let inner = self.parse_expression()?;
                self.expect(Tok::RParen, "')'")?;
                inner
            }
            Tok::LBracket => self.parse_array_items(Tok::RBracket)?,
            Tok::Ident(name) => {
                let lower = name.to_ascii_lowercase();
                match lower.as_str() {
                    "true" => Expression::Boolean(true),
                    "false" => Expression::Boolean(false),
                    "null" => Expression::Null,
                    "array" if *self.peek() == Tok::LParen => {
                        self.advance();
                        self.parse_array_items(Tok::RParen)?
                    }
                    _ if *self.peek() == Tok::LParen => {
                        self.advance();
                        let args = self.parse_call_arguments()?;
                        Expression::FunctionCall { name, args }
                    }
                    _ => {
                        return Err(Error::template(format!(
                            "Unexpected identifier '{}'",
                            name
                        )))
                    }
                }
            }
            Tok::Eof => return Err(Error::template("Unexpected end of expression")),
            other => return Err(Error::template(format!("Unexpected {:?}", other))),
        };

        self.parse_postfix(primary)
    }

    fn parse_postfix(&mut self, mut expr: Expression) -> Result<Expression> {
        loop {
            match self.peek() {
                Tok::Arrow => {
                    self.advance();
                    match self.advance() {
                        Tok::Ident(name) => {
                            expr = Expression::Property {
                                object: Box::new(expr),
                                name,
                            }
                        }
                        other => {
                            return Err(Error::template(format!(
                                "Expected property name after '->' but found {:?}",
                                other
                            )))
                        }
                    }
                }
                Tok::LBracket => {
                    self.advance();
                    if *self.peek() == Tok::RBracket {
                        return Err(Error::template("Cannot use [] for reading"));
                    }
                    let index = self.parse_expression()?;
                    self.expect(Tok::RBracket, "']'")?;
                    expr = Expression::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_arguments(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        while *self.peek() != Tok::RParen {
            args.push(self.parse_expression()?);
            if *self.peek() == Tok::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(Tok::RParen, "')' after arguments")?;
        Ok(args)
    }

    fn parse_array_items(&mut self, close: Tok) -> Result<Expression> {
        let mut items = Vec::new();
        while *self.peek() != close {
            let first = self.parse_expression()?;
            if *self.peek() == Tok::DoubleArrow {
                self.advance();
                let value = self.parse_expression()?;
                items.push((Some(first), value));
            } else {
                items.push((None, first));
            }
            if *self.peek() == Tok::Comma {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(close, "end of array literal")?;
        Ok(Expression::Array(items))
    }

    /// Comma separated expressions up to the end of input
    pub fn parse_arguments(&mut self) -> Result<Vec<Expression>> {
        let mut args = Vec::new();
        if *self.peek() == Tok::Eof {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.advance() {
                Tok::Comma => continue,
                Tok::Eof => return Ok(args),
                other => return Err(Error::template(format!("Unexpected {:?}", other))),
            }
        }
    }

    /// `;` separated statements up to the end of input
    pub fn parse_statements(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while *self.peek() == Tok::Semicolon {
                self.advance();
            }
            if *self.peek() == Tok::Eof {
                return Ok(statements);
            }
            statements.push(self.parse_statement()?);
            match self.peek() {
                Tok::Semicolon | Tok::Eof => {}
                other => {
                    return Err(Error::template(format!(
                        "Expected ';' after statement but found {:?}",
                        other
                    )))
                }
            }
        }
    }

    /// Comma separated statements, as used by `@for` init and step clauses
    fn parse_statement_list(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        if *self.peek() == Tok::Eof {
            return Ok(statements);
        }
        loop {
            statements.push(self.parse_statement()?);
            match self.advance() {
                Tok::Comma => continue,
                Tok::Eof => return Ok(statements),
                other => return Err(Error::template(format!("Unexpected {:?}", other))),
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        if self.is_keyword("echo") {
            self.advance();
            let mut exprs = vec![self.parse_expression()?];
            while *self.peek() == Tok::Comma {
                self.advance();
                exprs.push(self.parse_expression()?);
            }
            return Ok(Statement::Echo(exprs));
        }

        if self.is_keyword("unset") && *self.peek_at(1) == Tok::LParen {
            self.advance();
            self.advance();
            let mut targets = Vec::new();
            loop {
                targets.push(self.parse_target()?);
                if *self.peek() == Tok::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(Tok::RParen, "')' after unset")?;
            return Ok(Statement::Unset(targets));
        }

        if matches!(self.peek(), Tok::Increment | Tok::Decrement) {
            let delta = if self.advance() == Tok::Increment { 1 } else { -1 };
            let target = self.parse_target()?;
            return Ok(Statement::Increment { target, delta });
        }

        if matches!(self.peek(), Tok::Variable(_)) {
            let start = self.position;
            let target = self.parse_target()?;
            match self.peek().clone() {
                Tok::Assign(op) => {
                    self.advance();
                    let value = self.parse_expression()?;
                    return Ok(Statement::Assign { target, op, value });
                }
                Tok::Increment => {
                    self.advance();
                    return Ok(Statement::Increment { target, delta: 1 });
                }
                Tok::Decrement => {
                    self.advance();
                    return Ok(Statement::Increment { target, delta: -1 });
                }
                _ => self.position = start,
            }
        }

        Ok(Statement::Expr(self.parse_expression()?))
    }

    fn parse_target(&mut self) -> Result<Target> {
        let name = match self.advance() {
            Tok::Variable(name) => name,
            other => {
                return Err(Error::template(format!(
                    "Expected variable but found {:?}",
                    other
                )))
            }
        };

        let mut path = Vec::new();
        loop {
            match self.peek() {
                Tok::LBracket => {
                    self.advance();
                    if *self.peek() == Tok::RBracket {
                        self.advance();
                        path.push(Accessor::Push);
                    } else {
                        let index = self.parse_expression()?;
                        self.expect(Tok::RBracket, "']'")?;
                        path.push(Accessor::Index(index));
                    }
                }
                Tok::Arrow => {
                    self.advance();
                    match self.advance() {
                        Tok::Ident(prop) => path.push(Accessor::Property(prop)),
                        other => {
                            return Err(Error::template(format!(
                                "Expected property name after '->' but found {:?}",
                                other
                            )))
                        }
                    }
                }
                _ => return Ok(Target { name, path }),
            }
        }
    }
}

fn interpolate(parts: Vec<StrPart>) -> Expression {
    let mut exprs = parts.into_iter().map(|part| match part {
        StrPart::Literal(text) => Expression::String(text),
        StrPart::Variable(name) => Expression::Variable(name),
    });
    let first = exprs.next().unwrap_or(Expression::String(String::new()));
    exprs.fold(first, |left, right| Expression::Binary {
        op: BinaryOperator::Concat,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// Parse a complete expression
pub fn parse_expression(source: &str) -> Result<Expression> {
    let mut parser = ExpressionParser::new(source)?;
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a comma separated argument list
pub fn parse_arguments(source: &str) -> Result<Vec<Expression>> {
    ExpressionParser::new(source)?.parse_arguments()
}

/// Parse the body of a `@php` block
pub fn parse_statements(source: &str) -> Result<Vec<Statement>> {
    ExpressionParser::new(source)?.parse_statements()
}

/// Parse `collection as $value` or `collection as $key => $value`
pub fn parse_foreach(source: &str) -> Result<(Expression, Option<String>, String)> {
    let mut parser = ExpressionParser::new(source)?;
    let collection = parser.parse_expression()?;
    if !parser.is_keyword("as") {
        return Err(Error::template("Expected 'as' in @foreach"));
    }
    parser.advance();

    let first = match parser.advance() {
        Tok::Variable(name) => name,
        other => {
            return Err(Error::template(format!(
                "Expected loop variable in @foreach but found {:?}",
                other
            )))
        }
    };

    let result = if *parser.peek() == Tok::DoubleArrow {
        parser.advance();
        match parser.advance() {
            Tok::Variable(value) => (collection, Some(first), value),
            other => {
                return Err(Error::template(format!(
                    "Expected value variable in @foreach but found {:?}",
                    other
                )))
            }
        }
    } else {
        (collection, None, first)
    };
    parser.expect_end()?;
    Ok(result)
}

/// Parse `init; condition; step`
pub fn parse_for(
    source: &str,
) -> Result<(Vec<Statement>, Option<Expression>, Vec<Statement>)> {
    let tokens = tokenize(source)?;
    let mut clauses: Vec<Vec<Tok>> = vec![Vec::new()];
    for token in tokens {
        match token {
            Tok::Semicolon => clauses.push(Vec::new()),
            Tok::Eof => {}
            other => {
                if let Some(clause) = clauses.last_mut() {
                    clause.push(other);
                }
            }
        }
    }
    if clauses.len() != 3 {
        return Err(Error::template(
            "@for expects three clauses separated by ';'",
        ));
    }

    let mut clauses = clauses.into_iter();
    let init_tokens = clauses.next().unwrap_or_default();
    let condition_tokens = clauses.next().unwrap_or_default();
    let step_tokens = clauses.next().unwrap_or_default();

    let init = ExpressionParser::from_tokens(init_tokens).parse_statement_list()?;
    let condition = if condition_tokens.is_empty() {
        None
    } else {
        let mut parser = ExpressionParser::from_tokens(condition_tokens);
        let expr = parser.parse_expression()?;
        parser.expect_end()?;
        Some(expr)
    };
    let step = ExpressionParser::from_tokens(step_tokens).parse_statement_list()?;

    Ok((init, condition, step))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        match expr {
            Expression::Binary {
                op: BinaryOperator::Add,
                right,
                ..
            } => assert!(matches!(
                *right,
                Expression::Binary {
                    op: BinaryOperator::Multiply,
                    ..
                }
            )),
            _ => panic!("Expected addition at the root"),
        }
    }

    #[test]
    fn test_concat_binds_looser_than_addition() {
        let expr = parse_expression("'n: ' . $a + 1").unwrap();
        match expr {
            Expression::Binary {
                op: BinaryOperator::Concat,
                ..
            } => {}
            _ => panic!("Expected concatenation at the root"),
        }
    }

    #[test]
    fn test_property_and_index_chain() {
        let expr = parse_expression("$user->posts[0]['title']").unwrap();
        match expr {
            Expression::Index { object, index } => {
                assert_eq!(*index, Expression::String("title".into()));
                assert!(matches!(*object, Expression::Index { .. }));
            }
            _ => panic!("Expected index expression"),
        }
    }

    #[test]
    fn test_ternary_and_coalesce() {
        let expr = parse_expression("$a ?? $b ? 'x' : 'y'").unwrap();
        match expr {
            Expression::Ternary {
                condition,
                then_expr,
                ..
            } => {
                assert!(matches!(
                    *condition,
                    Expression::Binary {
                        op: BinaryOperator::Coalesce,
                        ..
                    }
                ));
                assert_eq!(then_expr.map(|e| *e), Some(Expression::String("x".into())));
            }
            _ => panic!("Expected ternary"),
        }

        let short = parse_expression("$name ?: 'Guest'").unwrap();
        assert!(matches!(short, Expression::Ternary { then_expr: None, .. }));
    }

    #[test]
    fn test_array_literals() {
        let expr = parse_expression("['a' => 1, 2, array(3)]").unwrap();
        match expr {
            Expression::Array(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0].0, Some(Expression::String("a".into())));
                assert_eq!(items[1].0, None);
            }
            _ => panic!("Expected array literal"),
        }
    }

    #[test]
    fn test_string_interpolation() {
        let expr = parse_expression("\"Hello $name!\"").unwrap();
        assert_eq!(
            expr,
            Expression::Binary {
                op: BinaryOperator::Concat,
                left: Box::new(Expression::Binary {
                    op: BinaryOperator::Concat,
                    left: Box::new(Expression::String("Hello ".into())),
                    right: Box::new(var("name")),
                }),
                right: Box::new(Expression::String("!".into())),
            }
        );
        assert_eq!(
            parse_expression("'no $interp\\'s'").unwrap(),
            Expression::String("no $interp's".into())
        );
    }

    #[test]
    fn test_keywords_and_not() {
        let expr = parse_expression("!$a and $b or TRUE").unwrap();
        assert!(matches!(
            expr,
            Expression::Binary {
                op: BinaryOperator::Or,
                ..
            }
        ));
    }

    #[test]
    fn test_statements() {
        let statements =
            parse_statements("$a = 1; $a += 2; $list[] = $a; $user->name = 'x'; $i++; --$j; echo $a, 'b'; unset($a);")
                .unwrap();
        assert_eq!(statements.len(), 8);
        assert!(matches!(
            &statements[2],
            Statement::Assign { target, .. } if target.path == vec![Accessor::Push]
        ));
        assert!(matches!(&statements[4], Statement::Increment { delta: 1, .. }));
        assert!(matches!(&statements[5], Statement::Increment { delta: -1, .. }));
        assert!(matches!(&statements[6], Statement::Echo(exprs) if exprs.len() == 2));
        assert!(matches!(&statements[7], Statement::Unset(_)));
    }

    #[test]
    fn test_expression_statement_falls_back() {
        let statements = parse_statements("$a == 1").unwrap();
        assert!(matches!(&statements[0], Statement::Expr(_)));
    }

    #[test]
    fn test_foreach_forms() {
        let (collection, key, value) = parse_foreach("$items as $item").unwrap();
        assert_eq!(collection, var("items"));
        assert_eq!(key, None);
        assert_eq!(value, "item");

        let (_, key, value) = parse_foreach("$map as $k => $v").unwrap();
        assert_eq!(key.as_deref(), Some("k"));
        assert_eq!(value, "v");

        assert!(parse_foreach("$items").is_err());
    }

    #[test]
    fn test_for_clauses() {
        let (init, condition, step) = parse_for("$i = 0; $i < 3; $i++").unwrap();
        assert_eq!(init.len(), 1);
        assert!(condition.is_some());
        assert_eq!(step.len(), 1);

        let (init, condition, step) = parse_for(";;").unwrap();
        assert!(init.is_empty() && condition.is_none() && step.is_empty());

        assert!(parse_for("$i = 0; $i < 3").is_err());
    }

    #[test]
    fn test_errors() {
        assert!(parse_expression("$a +").is_err());
        assert!(parse_expression("foo").is_err());
        assert!(parse_expression("'open").is_err());
        assert!(parse_expression("$a $b").is_err());
        assert!(parse_expression("$a[]").is_err());
    }
}

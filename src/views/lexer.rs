use crate::error::{Error, Result};
use std::fmt;

/// Directives that require a parenthesized argument list
const ARG_DIRECTIVES: &[&str] = &[
    "if",
    "elseif",
    "foreach",
    "for",
    "while",
    "enddo",
    "extends",
    "include",
    "section",
    "yield",
    "notification",
    "hasNotification",
    "datetime",
    "echo",
];

/// Directives that never take arguments
const BARE_DIRECTIVES: &[&str] = &[
    "else",
    "endif",
    "endforeach",
    "endfor",
    "endwhile",
    "do",
    "endsection",
    "endhasNotification",
    "year",
    "month",
    "date",
    "time",
    "csrf",
    "php",
    "endphp",
    "break",
    "continue",
];

/// Token types for Squehub templates
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Text(String),
    /// `{{ source }}` or `@echo(source)` when `raw`
    Echo { source: String, raw: bool },
    /// `@name` or `@name(args)`
    Directive { name: String, args: Option<String> },
    /// Body of a `@php ... @endphp` block
    Php(String),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {}:{}", self.kind, self.line, self.column)
    }
}

/// Single-pass tokenizer for Squehub templates
///
/// HTML comments are dropped. `@word` only starts a directive when `word` is a
/// known directive name and the `@` does not follow a letter or digit, so
/// e-mail addresses and unknown at-words pass through as text.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
            line: 1,
            column: 1,
        }
    }

    fn advance(&mut self) {
        if self.current_char == Some('\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn starts_with(&self, pattern: &str) -> bool {
        let mut index = self.position;
        for expected in pattern.chars() {
            match self.input.get(index) {
                Some(&ch) if ch == expected => index += 1,
                _ => return false,
            }
        }
        true
    }

    fn error_at(&self, message: String, line: usize, column: usize) -> Error {
        Error::template(format!("{} at line {}, column {}", message, line, column))
    }

    /// Tokenize the whole input; the last token is always `Eof`
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut text = String::new();
        let mut text_start = (self.line, self.column);

        while let Some(ch) = self.current_char {
            let special = if ch == '<' && self.starts_with("<!--") {
                self.skip_comment();
                None
            } else if ch == '{' && self.peek() == Some('{') {
                Some(self.read_echo()?)
            } else if ch == '@' && self.directive_name().is_some() {
                Some(self.read_directive()?)
            } else {
                if text.is_empty() {
                    text_start = (self.line, self.column);
                }
                text.push(ch);
                self.advance();
                continue;
            };

            if !text.is_empty() {
                tokens.push(Token::new(
                    TokenKind::Text(std::mem::take(&mut text)),
                    text_start.0,
                    text_start.1,
                ));
            }
            if let Some(token) = special {
                tokens.push(token);
            }
        }

        if !text.is_empty() {
            tokens.push(Token::new(TokenKind::Text(text), text_start.0, text_start.1));
        }
        tokens.push(Token::new(TokenKind::Eof, self.line, self.column));
        Ok(tokens)
    }

    /// Skip `<!-- ... -->`; an unterminated comment swallows the rest of the input
    fn skip_comment(&mut self) {
        self.advance_by(4);
        while self.current_char.is_some() {
            if self.starts_with("-->") {
                self.advance_by(3);
                return;
            }
            self.advance();
        }
    }

    /// Directive name at the current `@`, if it is a known one
    ///
    /// Directives may follow text directly (`Title@endsection`). After a
    /// letter or digit the `@` is read as part of an e-mail address when the
    /// word continues as a domain (`info@if.com`), or when a directive that
    /// needs arguments has none.
    fn directive_name(&self) -> Option<&'static str> {
        let rest = &self.input[self.position + 1..];
        let word_len = rest
            .iter()
            .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
            .count();
        let word: String = rest[..word_len].iter().collect();

        let name = ARG_DIRECTIVES
            .iter()
            .chain(BARE_DIRECTIVES.iter())
            .find(|name| **name == word)
            .copied()?;

        let glued = self.position > 0 && self.input[self.position - 1].is_alphanumeric();
        if glued {
            let after = &rest[word_len..];
            let domain = after.first() == Some(&'.')
                && after.get(1).is_some_and(|c| c.is_alphanumeric());
            let missing_args = ARG_DIRECTIVES.contains(&name)
                && after.iter().copied().find(|c| *c != ' ' && *c != '\t') != Some('(');
            if domain || missing_args {
                return None;
            }
        }
        Some(name)
    }

    fn read_directive(&mut self) -> Result<Token> {
        let (line, column) = (self.line, self.column);
        let name = self
            .directive_name()
            .ok_or_else(|| self.error_at("Expected directive".to_string(), line, column))?;
        self.advance_by(name.chars().count() + 1);

        if name == "php" {
            return self.read_php_block(line, column);
        }

        if !ARG_DIRECTIVES.contains(&name) {
            return Ok(Token::new(
                TokenKind::Directive {
                    name: name.to_string(),
                    args: None,
                },
                line,
                column,
            ));
        }

        while matches!(self.current_char, Some(' ') | Some('\t')) {
            self.advance();
        }
        if self.current_char != Some('(') {
            return Err(self.error_at(
                format!("Directive @{} expects an argument list", name),
                line,
                column,
            ));
        }
        let args = self.read_balanced(name, line, column)?;

        let kind = if name == "echo" {
            TokenKind::Echo {
                source: args.trim().to_string(),
                raw: true,
            }
        } else {
            TokenKind::Directive {
                name: name.to_string(),
                args: Some(args),
            }
        };
        Ok(Token::new(kind, line, column))
    }

    /// Read a parenthesized argument list, honoring nesting and quoted strings
    fn read_balanced(&mut self, name: &str, line: usize, column: usize) -> Result<String> {
        let mut result = String::new();
        let mut depth = 0usize;

        while let Some(ch) = self.current_char {
            match ch {
                '\'' | '"' => {
                    self.read_quoted(ch, &mut result);
                    continue;
                }
                '(' => {
                    depth += 1;
                    if depth == 1 {
                        self.advance();
                        continue;
                    }
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return Ok(result);
                    }
                }
                _ => {}
            }
            result.push(ch);
            self.advance();
        }

        Err(self.error_at(
            format!("Unbalanced parentheses in @{}", name),
            line,
            column,
        ))
    }

    /// Copy a quoted string literal verbatim, including its quotes
    fn read_quoted(&mut self, quote: char, out: &mut String) {
        out.push(quote);
        self.advance();
        while let Some(ch) = self.current_char {
            out.push(ch);
            self.advance();
            if ch == '\\' {
                if let Some(escaped) = self.current_char {
                    out.push(escaped);
                    self.advance();
                }
            } else if ch == quote {
                return;
            }
        }
    }

    fn read_echo(&mut self) -> Result<Token> {
        let (line, column) = (self.line, self.column);
        self.advance_by(2);

        let mut source = String::new();
        while let Some(ch) = self.current_char {
            if ch == '\'' || ch == '"' {
                self.read_quoted(ch, &mut source);
                continue;
            }
            if ch == '}' && self.peek() == Some('}') {
                self.advance_by(2);
                return Ok(Token::new(
                    TokenKind::Echo {
                        source: source.trim().to_string(),
                        raw: false,
                    },
                    line,
                    column,
                ));
            }
            source.push(ch);
            self.advance();
        }

        Err(self.error_at("Unclosed '{{'".to_string(), line, column))
    }

    fn read_php_block(&mut self, line: usize, column: usize) -> Result<Token> {
        let mut body = String::new();
        while let Some(ch) = self.current_char {
            if self.starts_with("@endphp") {
                self.advance_by("@endphp".len());
                return Ok(Token::new(TokenKind::Php(body), line, column));
            }
            body.push(ch);
            self.advance();
        }
        Err(self.error_at("Unclosed @php block".to_string(), line, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_plain_text() {
        let tokens = kinds("Hello World");
        assert_eq!(tokens.len(), 2);
        match &tokens[0] {
            TokenKind::Text(text) => assert_eq!(text, "Hello World"),
            _ => panic!("Expected text token"),
        }
        assert_eq!(tokens[1], TokenKind::Eof);
    }

    #[test]
    fn test_echo_tokens() {
        let tokens = kinds("Hi {{ $name }}! @echo($html)");
        assert_eq!(
            tokens[1],
            TokenKind::Echo {
                source: "$name".into(),
                raw: false
            }
        );
        assert_eq!(
            tokens[3],
            TokenKind::Echo {
                source: "$html".into(),
                raw: true
            }
        );
    }

    #[test]
    fn test_echo_with_braces_in_string() {
        let tokens = kinds("{{ '}}' . $x }}");
        assert_eq!(
            tokens[0],
            TokenKind::Echo {
                source: "'}}' . $x".into(),
                raw: false
            }
        );
    }

    #[test]
    fn test_comments_are_removed() {
        let tokens = kinds("a<!-- @if($x) {{ $y }} -->b");
        assert_eq!(tokens[0], TokenKind::Text("a".into()));
        assert_eq!(tokens[1], TokenKind::Text("b".into()));
    }

    #[test]
    fn test_email_is_not_a_directive() {
        let tokens = kinds("mail me at info@if.com or @unknown");
        assert_eq!(tokens.len(), 2);
        match &tokens[0] {
            TokenKind::Text(text) => assert_eq!(text, "mail me at info@if.com or @unknown"),
            _ => panic!("Expected text token"),
        }
    }

    #[test]
    fn test_directives_glued_to_text() {
        let tokens = kinds("Dashboard@endsection yes@else Copyright@year");
        assert_eq!(tokens[0], TokenKind::Text("Dashboard".into()));
        assert_eq!(
            tokens[1],
            TokenKind::Directive {
                name: "endsection".into(),
                args: None
            }
        );
        assert_eq!(tokens[2], TokenKind::Text(" yes".into()));
        assert_eq!(
            tokens[3],
            TokenKind::Directive {
                name: "else".into(),
                args: None
            }
        );
        assert_eq!(tokens[4], TokenKind::Text(" Copyright".into()));
        assert_eq!(
            tokens[5],
            TokenKind::Directive {
                name: "year".into(),
                args: None
            }
        );
    }

    #[test]
    fn test_glued_directive_without_arguments_stays_text() {
        let tokens = kinds("team@include me, sales@date.org");
        assert_eq!(
            tokens[0],
            TokenKind::Text("team@include me, sales@date.org".into())
        );
    }

    #[test]
    fn test_nested_parentheses() {
        let tokens = kinds("@if (count($items) > (1 + 1))yes @endif");
        assert_eq!(
            tokens[0],
            TokenKind::Directive {
                name: "if".into(),
                args: Some("count($items) > (1 + 1)".into())
            }
        );
        assert_eq!(tokens[1], TokenKind::Text("yes ".into()));
    }

    #[test]
    fn test_parenthesis_inside_string_argument() {
        let tokens = kinds("@section('a)b')");
        assert_eq!(
            tokens[0],
            TokenKind::Directive {
                name: "section".into(),
                args: Some("'a)b'".into())
            }
        );
    }

    #[test]
    fn test_full_identifier_matching() {
        let tokens = kinds("@datetime('Y') @date @yearly");
        assert_eq!(
            tokens[0],
            TokenKind::Directive {
                name: "datetime".into(),
                args: Some("'Y'".into())
            }
        );
        assert_eq!(
            tokens[2],
            TokenKind::Directive {
                name: "date".into(),
                args: None
            }
        );
        assert_eq!(tokens[3], TokenKind::Text(" @yearly".into()));
    }

    #[test]
    fn test_php_block() {
        let tokens = kinds("@php $a = 1; @endphp{{ $a }}");
        assert_eq!(tokens[0], TokenKind::Php(" $a = 1; ".into()));
    }

    #[test]
    fn test_positions() {
        let tokens = Lexer::new("line one\n  @csrf").tokenize().unwrap();
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].column, 3);
    }

    #[test]
    fn test_errors() {
        assert!(Lexer::new("@if($a").tokenize().is_err());
        assert!(Lexer::new("{{ $a ").tokenize().is_err());
        assert!(Lexer::new("@php $a = 1;").tokenize().is_err());
        let err = Lexer::new("x\n@section").tokenize().unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}

#![forbid(unsafe_code)]

//! Binding expression parser.
//!
//! ```text
//! Expr  := Decl (";" Decl)*          empty declarations are allowed
//! Decl  := Path ":" Path [Path]      destination, source, initializer
//! Path  := (Ident | Literal) Step*
//! Step  := "." Ident | "[" (Number | Literal) "]"
//! ```
//!
//! [`parse`] resolves each initializer path against a context value and
//! keeps the resulting [`Initializer`]. [`parse_strict`] leaves it as an
//! unresolved [`Path`] and evaluates nothing.

use std::fmt;

use super::Initializer;
use super::lexer::{Token, TokenKind, tokenize};
use super::path::{Path, PathSegment, read_segment};
use crate::error::BindingError;
use crate::value::Value;

/// A malformed binding expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The full expression text.
    pub text: String,
    /// Byte offset of the offending token.
    pub offset: usize,
    /// What was found there.
    pub found: String,
    /// Token kinds that would have been accepted.
    pub expected: Vec<TokenKind>,
}

impl ParseError {
    pub(crate) fn new(
        text: &str,
        offset: usize,
        found: impl Into<String>,
        expected: Vec<TokenKind>,
    ) -> Self {
        Self {
            text: text.to_owned(),
            offset,
            found: found.into(),
            expected,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid binding expression '{}' at offset {}: found {}",
            self.text, self.offset, self.found
        )?;
        if !self.expected.is_empty() {
            f.write_str(", expected ")?;
            for (i, kind) in self.expected.iter().enumerate() {
                if i > 0 {
                    f.write_str(" or ")?;
                }
                write!(f, "{kind}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Initializer attached to a declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum InitializerRef {
    /// Looked up at parse time.
    Resolved(Initializer),
    /// Path left for the caller to resolve.
    Unresolved(Path),
}

impl InitializerRef {
    #[must_use]
    pub fn resolved(&self) -> Option<&Initializer> {
        match self {
            Self::Resolved(initializer) => Some(initializer),
            Self::Unresolved(_) => None,
        }
    }
}

/// One `destination: source [initializer]` triple.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingDeclaration {
    pub destination: Path,
    pub source: Path,
    pub initializer: Option<InitializerRef>,
}

struct RawDeclaration {
    destination: Path,
    source: Path,
    initializer: Option<Path>,
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Result<Self, ParseError> {
        Ok(Self {
            text,
            tokens: tokenize(text)?,
            pos: 0,
        })
    }

    fn peek(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map_or(TokenKind::Eof, |token| token.kind)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, expected: Vec<TokenKind>) -> ParseError {
        let (offset, found) = match self.tokens.get(self.pos) {
            Some(token) if token.kind == TokenKind::Eof => (token.offset, TokenKind::Eof.to_string()),
            Some(token) => (token.offset, format!("'{}'", token.text)),
            None => (self.text.len(), TokenKind::Eof.to_string()),
        };
        ParseError::new(self.text, offset, found, expected)
    }

    fn expect(&mut self, kinds: &[TokenKind]) -> Result<Token, ParseError> {
        if kinds.contains(&self.peek()) {
            if let Some(token) = self.advance() {
                return Ok(token.clone());
            }
        }
        Err(self.error(kinds.to_vec()))
    }

    fn expression(&mut self) -> Result<Vec<RawDeclaration>, ParseError> {
        let mut out = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Eof => return Ok(out),
                TokenKind::Semicolon => {
                    self.advance();
                }
                _ => {
                    out.push(self.declaration()?);
                    let separator = self.expect(&[TokenKind::Semicolon, TokenKind::Eof])?;
                    if separator.kind == TokenKind::Eof {
                        return Ok(out);
                    }
                }
            }
        }
    }

    fn declaration(&mut self) -> Result<RawDeclaration, ParseError> {
        let destination = self.path()?;
        self.expect(&[TokenKind::Colon])?;
        let source = self.path()?;
        let initializer = match self.peek() {
            TokenKind::Identifier | TokenKind::StringLiteral => Some(self.path()?),
            _ => None,
        };
        Ok(RawDeclaration {
            destination,
            source,
            initializer,
        })
    }

    fn path(&mut self) -> Result<Path, ParseError> {
        let head = self.expect(&[TokenKind::Identifier, TokenKind::StringLiteral])?;
        let mut segments = vec![PathSegment::Field(head.text)];
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect(&[TokenKind::Identifier])?;
                    segments.push(PathSegment::Field(name.text));
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let key = self.expect(&[TokenKind::Number, TokenKind::StringLiteral])?;
                    segments.push(bracket_segment(key));
                    self.expect(&[TokenKind::RightBracket])?;
                }
                _ => return Ok(Path::new(segments)),
            }
        }
    }
}

fn bracket_segment(token: Token) -> PathSegment {
    if token.kind == TokenKind::Number {
        if let Ok(index) = token.text.parse::<usize>() {
            return PathSegment::Index(index);
        }
    }
    PathSegment::Field(token.text)
}

/// Parse `text` without evaluating initializer paths.
pub fn parse_strict(text: &str) -> Result<Vec<BindingDeclaration>, ParseError> {
    let raw = Parser::new(text)?.expression()?;
    Ok(raw
        .into_iter()
        .map(|decl| BindingDeclaration {
            destination: decl.destination,
            source: decl.source,
            initializer: decl.initializer.map(InitializerRef::Unresolved),
        })
        .collect())
}

/// Parse `text`, resolving initializer paths against `context`.
///
/// Resolution reads properties of `context`, which may run whatever the
/// context's storage does on read. A path that is missing or does not name
/// an initializer is logged and dropped; the declaration is kept.
pub fn parse(text: &str, context: &Value) -> Result<Vec<BindingDeclaration>, ParseError> {
    let raw = Parser::new(text)?.expression()?;
    Ok(raw
        .into_iter()
        .map(|decl| {
            let initializer = decl
                .initializer
                .and_then(|path| resolve_initializer(&path, context, text))
                .map(InitializerRef::Resolved);
            BindingDeclaration {
                destination: decl.destination,
                source: decl.source,
                initializer,
            }
        })
        .collect())
}

/// Resolve `path` through `context` to an [`Initializer`].
pub fn resolve_initializer(path: &Path, context: &Value, expression: &str) -> Option<Initializer> {
    match lookup_initializer(path, context) {
        Ok(initializer) => Some(initializer),
        Err((err, found)) => {
            tracing::warn!(
                target: "bindweave::parser",
                initializer = %path,
                expression,
                found,
                error = %err,
                "initializer could not be resolved; binding without it"
            );
            None
        }
    }
}

/// Read `path` through `context`. On failure also names what was found
/// where the initializer should have been.
fn lookup_initializer(path: &Path, context: &Value) -> Result<Initializer, (BindingError, &'static str)> {
    let unresolved = || BindingError::UnresolvedInitializer {
        path: path.to_string(),
    };
    let mut current = context.clone();
    for segment in path.segments() {
        current = read_segment(&current, segment).ok_or_else(|| (unresolved(), "nothing"))?;
    }
    match current {
        Value::Initializer(initializer) => Ok(initializer),
        other => Err((unresolved(), other.type_name())),
    }
}

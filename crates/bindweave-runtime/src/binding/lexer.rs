#![forbid(unsafe_code)]

//! Tokenizer for binding expressions.

use std::fmt;

use super::parser::ParseError;

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Number,
    StringLiteral,
    Dot,
    Colon,
    Semicolon,
    LeftBracket,
    RightBracket,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identifier => "identifier",
            Self::Number => "number",
            Self::StringLiteral => "string literal",
            Self::Dot => "'.'",
            Self::Colon => "':'",
            Self::Semicolon => "';'",
            Self::LeftBracket => "'['",
            Self::RightBracket => "']'",
            Self::Eof => "end of input",
        })
    }
}

/// One token with its byte offset in the source.
///
/// For string literals `text` holds the unescaped contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            offset,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Split `source` into tokens. The result always ends with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let punct = match c {
            '.' => Some(TokenKind::Dot),
            ':' => Some(TokenKind::Colon),
            ';' => Some(TokenKind::Semicolon),
            '[' => Some(TokenKind::LeftBracket),
            ']' => Some(TokenKind::RightBracket),
            _ => None,
        };
        if let Some(kind) = punct {
            chars.next();
            tokens.push(Token::new(kind, c.to_string(), offset));
            continue;
        }

        if c.is_whitespace() {
            chars.next();
        } else if is_ident_start(c) {
            let mut end = offset;
            while let Some(&(i, c)) = chars.peek() {
                if !is_ident_continue(c) {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            tokens.push(Token::new(TokenKind::Identifier, &source[offset..end], offset));
        } else if c.is_ascii_digit() {
            let mut end = offset;
            let mut seen_dot = false;
            while let Some(&(i, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    end = i + 1;
                    chars.next();
                } else if c == '.' && !seen_dot && source[i + 1..].starts_with(|d: char| d.is_ascii_digit()) {
                    seen_dot = true;
                    end = i + 1;
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::new(TokenKind::Number, &source[offset..end], offset));
        } else if c == '"' || c == '\'' {
            let quote = c;
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, 't')) => text.push('\t'),
                        Some((_, escaped)) => text.push(escaped),
                        None => break,
                    },
                    c if c == quote => {
                        closed = true;
                        break;
                    }
                    c => text.push(c),
                }
            }
            if !closed {
                return Err(ParseError::new(
                    source,
                    offset,
                    "unterminated string literal",
                    vec![TokenKind::StringLiteral],
                ));
            }
            tokens.push(Token::new(TokenKind::StringLiteral, text, offset));
        } else {
            return Err(ParseError::new(
                source,
                offset,
                format!("unexpected character '{c}'"),
                Vec::new(),
            ));
        }
    }

    tokens.push(Token::new(TokenKind::Eof, "", source.len()));
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_declaration() {
        use TokenKind::*;
        assert_eq!(
            kinds("label: user.name"),
            vec![Identifier, Colon, Identifier, Dot, Identifier, Eof]
        );
    }

    #[test]
    fn identifiers_allow_dollar_and_underscore() {
        let tokens = tokenize("$scope _x a1").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["$scope", "_x", "a1", ""]);
    }

    #[test]
    fn brackets_numbers_and_strings() {
        use TokenKind::*;
        let tokens = tokenize(r#"a[0]['b c'][1.5]"#).unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                Identifier, LeftBracket, Number, RightBracket, LeftBracket, StringLiteral,
                RightBracket, LeftBracket, Number, RightBracket, Eof
            ]
        );
        assert_eq!(tokens[5].text, "b c");
        assert_eq!(tokens[8].text, "1.5");
    }

    #[test]
    fn number_followed_by_dot_segment() {
        use TokenKind::*;
        assert_eq!(kinds("1.a"), vec![Number, Dot, Identifier, Eof]);
    }

    #[test]
    fn escapes_are_unescaped() {
        let tokens = tokenize(r#""a\"b\\c""#).unwrap();
        assert_eq!(tokens[0].text, r#"a"b\c"#);
    }

    #[test]
    fn offsets_are_byte_positions() {
        let tokens = tokenize("  ab . c").unwrap();
        assert_eq!(tokens[0].offset, 2);
        assert_eq!(tokens[1].offset, 5);
        assert_eq!(tokens[2].offset, 7);
        assert_eq!(tokens[3].offset, 8);
    }

    #[test]
    fn unterminated_string_fails() {
        let err = tokenize("a: 'oops").unwrap_err();
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn stray_character_fails() {
        let err = tokenize("a: b + c").unwrap_err();
        assert_eq!(err.offset, 5);
        assert!(err.found.contains('+'));
    }
}

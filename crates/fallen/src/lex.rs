//! Lexer: source text to a token sequence.
//!
//! A one-character lookahead scanner. Whitespace and `#`-to-end-of-line
//! comments are skipped; every token carries its 1-based source line.

use std::{iter::Peekable, str::Chars};

use crate::ast::TypeMarker;

/// A lexical error with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: u32,
    pub message: String,
}

impl LexError {
    fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// The kind of a token, with literal payloads inline.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Ident(String),

    // Keywords
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Stop,
    Continue,
    Func,
    Return,
    Match,
    Import,
    Export,
    And,
    Or,
    Not,
    Set,
    To,
    Add,
    Insert,
    Remove,
    Call,
    Trace,
    On,
    Off,

    /// A typed assignment marker (`=s`, `=i`, `=f`, `=b`, `=l`, `=d`).
    Marker(TypeMarker),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,

    Eof,
}

impl TokenKind {
    /// Short description used in parse error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Int(v) => format!("integer {v}"),
            Self::Float(v) => format!("float {v}"),
            Self::Str(_) => "string literal".to_owned(),
            Self::Bool(v) => format!("'{v}'"),
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Marker(m) => format!("'{}'", m.as_str()),
            Self::Eof => "end of file".to_owned(),
            other => format!("'{}'", other.lexeme()),
        }
    }

    fn lexeme(&self) -> &'static str {
        match self {
            Self::If => "if",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::While => "while",
            Self::For => "for",
            Self::In => "in",
            Self::Stop => "stop",
            Self::Continue => "continue",
            Self::Func => "func",
            Self::Return => "return",
            Self::Match => "match",
            Self::Import => "import",
            Self::Export => "export",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::Set => "set",
            Self::To => "to",
            Self::Add => "add",
            Self::Insert => "insert",
            Self::Remove => "remove",
            Self::Call => "call",
            Self::Trace => "trace",
            Self::On => "on",
            Self::Off => "off",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Colon => ":",
            _ => unreachable!("lexeme() called on a payload token"),
        }
    }
}

/// A token with its 1-based source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

/// Lexes an entire source text into tokens, ending with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'src> {
    chars: Peekable<Chars<'src>>,
    line: u32,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next();
        if ch == Some('\n') {
            self.line += 1;
        }
        ch
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '#' {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else if ch.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia();
        let line = self.line;
        let Some(ch) = self.bump() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                line,
            });
        };

        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    return Err(LexError::new(line, "unexpected character '!'"));
                }
            }
            '=' => self.lex_equals(line)?,
            '"' => self.lex_string(line)?,
            ch if ch.is_ascii_digit() => self.lex_number(ch, line)?,
            ch if ch.is_ascii_alphabetic() || ch == '_' => self.lex_word(ch),
            other => {
                return Err(LexError::new(line, format!("unexpected character '{other}'")));
            }
        };

        Ok(Token { kind, line })
    }

    /// `=` starts either `==` or a type marker; a bare `=` does not exist in
    /// the language.
    fn lex_equals(&mut self, line: u32) -> Result<TokenKind, LexError> {
        match self.peek() {
            Some('=') => {
                self.bump();
                Ok(TokenKind::EqEq)
            }
            Some(ch) => {
                let marker = match ch {
                    's' => TypeMarker::Str,
                    'i' => TypeMarker::Int,
                    'f' => TypeMarker::Float,
                    'b' => TypeMarker::Bool,
                    'l' => TypeMarker::List,
                    'd' => TypeMarker::Dict,
                    other => {
                        return Err(LexError::new(line, format!("expected a type marker after '=', found '{other}'")));
                    }
                };
                self.bump();
                // `=sum` must not lex as `=s` followed by `um`.
                if let Some(next) = self.peek()
                    && (next.is_ascii_alphanumeric() || next == '_')
                {
                    return Err(LexError::new(
                        line,
                        format!("invalid type marker '={ch}{next}...'"),
                    ));
                }
                Ok(TokenKind::Marker(marker))
            }
            None => Err(LexError::new(line, "expected a type marker after '='")),
        }
    }

    fn lex_string(&mut self, line: u32) -> Result<TokenKind, LexError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(LexError::new(line, "unterminated string literal")),
                Some('"') => return Ok(TokenKind::Str(text)),
                Some('\\') => match self.bump() {
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(other) => {
                        return Err(LexError::new(self.line, format!("unknown escape '\\{other}'")));
                    }
                    None => return Err(LexError::new(line, "unterminated string literal")),
                },
                Some(ch) => text.push(ch),
            }
        }
    }

    fn lex_number(&mut self, first: char, line: u32) -> Result<TokenKind, LexError> {
        let mut text = String::from(first);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') {
            text.push('.');
            self.bump();
            let mut saw_digit = false;
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    text.push(ch);
                    self.bump();
                    saw_digit = true;
                } else {
                    break;
                }
            }
            if !saw_digit {
                return Err(LexError::new(line, "expected digits after decimal point"));
            }
            let value: f64 = text
                .parse()
                .map_err(|_| LexError::new(line, format!("invalid float literal '{text}'")))?;
            Ok(TokenKind::Float(value))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| LexError::new(line, format!("integer literal out of range '{text}'")))?;
            Ok(TokenKind::Int(value))
        }
    }

    fn lex_word(&mut self, first: char) -> TokenKind {
        let mut word = String::from(first);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                word.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        match word.as_str() {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "stop" => TokenKind::Stop,
            "continue" => TokenKind::Continue,
            "func" => TokenKind::Func,
            "return" => TokenKind::Return,
            "match" => TokenKind::Match,
            "import" => TokenKind::Import,
            "export" => TokenKind::Export,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "set" => TokenKind::Set,
            "to" => TokenKind::To,
            "add" => TokenKind::Add,
            "insert" => TokenKind::Insert,
            "remove" => TokenKind::Remove,
            "call" => TokenKind::Call,
            "trace" => TokenKind::Trace,
            "on" => TokenKind::On,
            "off" => TokenKind::Off,
            _ => TokenKind::Ident(word),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn markers_and_equality_disambiguate() {
        assert_eq!(
            kinds("x =i 1 == 2"),
            vec![
                TokenKind::Ident("x".to_owned()),
                TokenKind::Marker(TypeMarker::Int),
                TokenKind::Int(1),
                TokenKind::EqEq,
                TokenKind::Int(2),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_split_int_and_float() {
        assert_eq!(
            kinds("3 2.5"),
            vec![TokenKind::Int(3), TokenKind::Float(2.5), TokenKind::Eof]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\n\t\"\\b""#),
            vec![TokenKind::Str("a\n\t\"\\b".to_owned()), TokenKind::Eof]
        );
    }

    #[test]
    fn comments_and_lines() {
        let tokens = tokenize("a # comment\nb").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert_eq!(kinds("while"), vec![TokenKind::While, TokenKind::Eof]);
        assert_eq!(
            kinds("whiled"),
            vec![TokenKind::Ident("whiled".to_owned()), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = tokenize("\n\"abc").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.message, "unterminated string literal");
    }

    #[test]
    fn bare_equals_is_rejected() {
        let err = tokenize("x = 1").unwrap_err();
        assert!(err.message.contains("type marker"));
    }
}

use std::fmt;

use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    True,
    False,
    Return,
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Arrow,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    BangEqual,
    EqualEqual,
    DoubleAmpersand,
    DoublePipe,
    Question,
    DoubleQuestion,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Eof,
}

impl TokenKind {
    /// Kinds whose tokens must carry a value.
    pub const fn has_value(self) -> bool {
        matches!(
            self,
            TokenKind::Identifier | TokenKind::Number | TokenKind::String
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    value: Option<String>,
    pub span: SourceSpan,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        value: Option<String>,
        span: SourceSpan,
    ) -> Result<Self, Diagnostic> {
        if kind.has_value() && value.is_none() {
            return Err(Diagnostic::new(
                DiagnosticKind::Lexer,
                format!("a token of kind {kind:?} must carry a value"),
            )
            .with_span(span));
        }
        Ok(Self { kind, value, span })
    }

    fn bare(kind: TokenKind, span: SourceSpan) -> Self {
        Self {
            kind,
            value: None,
            span,
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Value of a value-carrying token; empty for every other kind.
    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{:?}({value})", self.kind),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    current: usize,
    peeked: Option<(usize, char)>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices(),
            current: 0,
            peeked: None,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = match self.peeked.take() {
            Some(pair) => Some(pair),
            None => self.chars.next(),
        };
        if let Some((idx, ch)) = next {
            self.current = idx + ch.len_utf8();
        }
        next
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn match_next(&mut self, expected: char) -> bool {
        match self.peek() {
            Some((_, ch)) if ch == expected => {
                self.bump();
                true
            }
            _ => false,
        }
    }

    fn collect_while<F>(&mut self, mut predicate: F)
    where
        F: FnMut(char) -> bool,
    {
        while let Some((_, ch)) = self.peek() {
            if !predicate(ch) {
                break;
            }
            self.bump();
        }
    }

    fn skip_whitespace(&mut self) {
        self.collect_while(char::is_whitespace);
    }

    fn identifier_or_keyword(&mut self, start: usize) -> Result<Token, Diagnostic> {
        self.collect_while(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        let span = SourceSpan::new(start, self.current);
        let lexeme = &self.source[start..self.current];
        match keyword_for(lexeme) {
            Some(keyword) => Ok(Token::bare(TokenKind::Keyword(keyword), span)),
            None => Token::new(TokenKind::Identifier, Some(lexeme.to_string()), span),
        }
    }

    fn number_literal(&mut self, start: usize) -> Result<Token, Diagnostic> {
        self.collect_while(|ch| ch.is_ascii_digit());
        if self.match_next('.') {
            let fraction_start = self.current;
            self.collect_while(|ch| ch.is_ascii_digit());
            if self.current == fraction_start {
                return Err(Diagnostic::new(
                    DiagnosticKind::Lexer,
                    "expected digits after decimal point",
                )
                .with_span(SourceSpan::new(start, self.current)));
            }
        }
        let span = SourceSpan::new(start, self.current);
        Token::new(
            TokenKind::Number,
            Some(self.source[start..self.current].to_string()),
            span,
        )
    }

    fn string_literal(&mut self, start: usize) -> Result<Token, Diagnostic> {
        let content_start = self.current;
        while let Some((idx, ch)) = self.bump() {
            if ch == '\'' {
                let value = self.source[content_start..idx].to_string();
                return Token::new(
                    TokenKind::String,
                    Some(value),
                    SourceSpan::new(start, self.current),
                );
            }
        }
        Err(
            Diagnostic::new(DiagnosticKind::Lexer, "unterminated string literal")
                .with_span(SourceSpan::new(start, self.current)),
        )
    }

    fn simple_token(&self, start: usize, kind: TokenKind) -> Token {
        Token::bare(kind, SourceSpan::new(start, self.current))
    }

    /// `two` if the next character is `next`, otherwise `one`.
    fn one_or_two(&mut self, start: usize, next: char, two: TokenKind, one: TokenKind) -> Token {
        let kind = if self.match_next(next) { two } else { one };
        self.simple_token(start, kind)
    }

    fn doubled(&mut self, start: usize, ch: char, kind: TokenKind) -> Result<Token, Diagnostic> {
        if self.match_next(ch) {
            Ok(self.simple_token(start, kind))
        } else {
            Err(
                Diagnostic::new(DiagnosticKind::Lexer, format!("expected `{ch}{ch}`"))
                    .with_span(SourceSpan::new(start, self.current)),
            )
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let (start, ch) = match self.bump() {
                Some(pair) => pair,
                None => {
                    tokens.push(Token::bare(
                        TokenKind::Eof,
                        SourceSpan::new(self.current, self.current),
                    ));
                    break;
                }
            };

            let token = match ch {
                'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(start)?,
                '0'..='9' => self.number_literal(start)?,
                '\'' => self.string_literal(start)?,
                '(' => self.simple_token(start, TokenKind::LParen),
                ')' => self.simple_token(start, TokenKind::RParen),
                '{' => self.simple_token(start, TokenKind::LBrace),
                '}' => self.simple_token(start, TokenKind::RBrace),
                '[' => self.simple_token(start, TokenKind::LBracket),
                ']' => self.simple_token(start, TokenKind::RBracket),
                ',' => self.simple_token(start, TokenKind::Comma),
                '.' => self.simple_token(start, TokenKind::Dot),
                ';' => self.simple_token(start, TokenKind::Semicolon),
                ':' => self.simple_token(start, TokenKind::Colon),
                '+' => self.simple_token(start, TokenKind::Plus),
                '*' => self.simple_token(start, TokenKind::Star),
                '/' => self.simple_token(start, TokenKind::Slash),
                '-' => self.one_or_two(start, '>', TokenKind::Arrow, TokenKind::Minus),
                '=' => self.one_or_two(start, '=', TokenKind::EqualEqual, TokenKind::Assign),
                '!' => self.one_or_two(start, '=', TokenKind::BangEqual, TokenKind::Bang),
                '?' => self.one_or_two(start, '?', TokenKind::DoubleQuestion, TokenKind::Question),
                '<' => self.one_or_two(start, '=', TokenKind::LessEqual, TokenKind::Less),
                '>' => self.one_or_two(start, '=', TokenKind::GreaterEqual, TokenKind::Greater),
                '&' => self.doubled(start, '&', TokenKind::DoubleAmpersand)?,
                '|' => self.doubled(start, '|', TokenKind::DoublePipe)?,
                other => {
                    return Err(Diagnostic::new(
                        DiagnosticKind::Lexer,
                        format!("unexpected character `{other}`"),
                    )
                    .with_span(SourceSpan::new(start, self.current)));
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn keyword_for(ident: &str) -> Option<Keyword> {
    let keyword = match ident {
        "true" => Keyword::True,
        "false" => Keyword::False,
        "return" => Keyword::Return,
        "break" => Keyword::Break,
        "continue" => Keyword::Continue,
        _ => return None,
    };
    Some(keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .expect("lexing should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_multi_character_operators() {
        assert_eq!(
            kinds("&& || <= >= == != ?? -> = ? :"),
            vec![
                TokenKind::DoubleAmpersand,
                TokenKind::DoublePipe,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::DoubleQuestion,
                TokenKind::Arrow,
                TokenKind::Assign,
                TokenKind::Question,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_offsets_and_values() {
        let tokens = Lexer::new("temp.x = 'hi'").tokenize().unwrap();
        assert_eq!(tokens[0].text(), "temp");
        assert_eq!(tokens[0].span, SourceSpan::new(0, 4));
        assert_eq!(tokens[2].span, SourceSpan::new(5, 6));
        assert_eq!(tokens[4].kind, TokenKind::String);
        assert_eq!(tokens[4].value(), Some("hi"));
        assert_eq!(tokens[4].span, SourceSpan::new(9, 13));
    }

    #[test]
    fn keywords_are_recognized() {
        assert_eq!(
            kinds("true false return break continue loop"),
            vec![
                TokenKind::Keyword(Keyword::True),
                TokenKind::Keyword(Keyword::False),
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Keyword(Keyword::Break),
                TokenKind::Keyword(Keyword::Continue),
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn value_tokens_require_a_value() {
        let err = Token::new(TokenKind::Number, None, SourceSpan::new(0, 1)).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Lexer);
        assert!(Token::new(TokenKind::Comma, None, SourceSpan::new(0, 1)).is_ok());
    }

    #[test]
    fn reports_malformed_tokens_with_offsets() {
        let err = Lexer::new("1 + 'open").tokenize().unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!(err.offset(), Some(4));

        let err = Lexer::new("a & b").tokenize().unwrap_err();
        assert_eq!(err.offset(), Some(2));

        let err = Lexer::new("3.").tokenize().unwrap_err();
        assert_eq!(err.message, "expected digits after decimal point");

        let err = Lexer::new("2 # 3").tokenize().unwrap_err();
        assert_eq!(err.offset(), Some(2));
    }
}

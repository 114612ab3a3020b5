//! PeaQL tokenizer.

use super::{Keyword, QuoteStyle, Span, Token, TokenKind};

/// Lexer configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexerOptions {
    /// When set, `[name]` is scanned as a delimited identifier instead of
    /// bracket punctuation (the `identifier_quoting = bracket` setting).
    pub bracket_identifiers: bool,
}

/// A lexer that tokenizes PeaQL query text.
pub struct Lexer<'a> {
    /// The input source text.
    input: &'a str,
    /// The current byte position.
    pos: usize,
    /// The byte position of the start of the current token.
    start: usize,
    /// Lexer behavior switches.
    options: LexerOptions,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self::with_options(input, LexerOptions { bracket_identifiers: false })
    }

    /// Creates a new lexer with explicit options.
    #[must_use]
    pub const fn with_options(input: &'a str, options: LexerOptions) -> Self {
        Self {
            input,
            pos: 0,
            start: 0,
            options,
        }
    }

    /// Returns the current character without advancing.
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Returns the character after the current one without advancing.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    /// Advances to the next character and returns it.
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consumes the next character if it equals `expected`.
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Skips whitespace and `--`/`/* */` comments.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }

            if self.peek() == Some('-') && self.peek_next() == Some('-') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }

            if self.peek() == Some('/') && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                continue;
            }

            break;
        }
    }

    /// Creates a token spanning from the token start to the current position.
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, Span::new(self.start, self.pos))
    }

    /// Scans an identifier or keyword.
    fn scan_identifier(&mut self) -> Token {
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }

        let text = &self.input[self.start..self.pos];
        if let Some(keyword) = Keyword::from_str(text) {
            self.make_token(TokenKind::Keyword(keyword))
        } else {
            self.make_token(TokenKind::Identifier(String::from(text)))
        }
    }

    /// Scans a delimited identifier, e.g. `"order date"` or `` `key` `` or `[col]`.
    ///
    /// A doubled closing delimiter escapes itself.
    fn scan_quoted(&mut self, close: char, style: QuoteStyle) -> Token {
        let content_start = self.pos;

        loop {
            match self.peek() {
                Some(c) if c == close => {
                    if self.peek_next() == Some(close) {
                        self.advance();
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(_) => {
                    self.advance();
                }
                None => {
                    return self.make_token(TokenKind::Error(String::from(
                        "unterminated delimited identifier",
                    )));
                }
            }
        }

        let content = &self.input[content_start..self.pos];
        self.advance(); // closing delimiter

        let unescaped = content.replace(&format!("{close}{close}"), &close.to_string());
        self.make_token(TokenKind::Quoted(unescaped, style))
    }

    /// Scans a number literal (integer or float).
    fn scan_number(&mut self) -> Token {
        let mut is_float = false;

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if self.peek().is_some_and(|c| c == 'e' || c == 'E') {
            is_float = true;
            self.advance();
            if self.peek().is_some_and(|c| c == '+' || c == '-') {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.input[self.start..self.pos];
        if is_float {
            match text.parse::<f64>() {
                Ok(f) => self.make_token(TokenKind::Float(f)),
                Err(e) => self.make_token(TokenKind::Error(format!("invalid float: {e}"))),
            }
        } else {
            match text.parse::<i64>() {
                Ok(i) => self.make_token(TokenKind::Integer(i)),
                Err(e) => self.make_token(TokenKind::Error(format!("invalid integer: {e}"))),
            }
        }
    }

    /// Scans a single-quoted string literal. `''` escapes a quote.
    fn scan_string(&mut self) -> Token {
        let mut value = String::new();

        loop {
            match self.peek() {
                Some('\'') => {
                    if self.peek_next() == Some('\'') {
                        value.push('\'');
                        self.advance();
                        self.advance();
                    } else {
                        break;
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
                None => {
                    return self.make_token(TokenKind::Error(String::from(
                        "unterminated string literal",
                    )));
                }
            }
        }

        self.advance(); // closing quote
        self.make_token(TokenKind::String(value))
    }

    /// Scans the next token.
    #[must_use]
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        self.start = self.pos;

        let Some(c) = self.advance() else {
            return self.make_token(TokenKind::Eof);
        };

        match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '[' if self.options.bracket_identifiers => self.scan_quoted(']', QuoteStyle::Bracket),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            ',' => self.make_token(TokenKind::Comma),
            ';' => self.make_token(TokenKind::Semicolon),
            '.' => self.make_token(TokenKind::Dot),
            '+' => self.make_token(TokenKind::Plus),
            '-' => self.make_token(TokenKind::Minus),
            '*' => self.make_token(TokenKind::Star),
            '/' => self.make_token(TokenKind::Slash),
            '%' => self.make_token(TokenKind::Percent),
            '=' => self.make_token(TokenKind::Eq),
            ':' => {
                if self.eat(':') {
                    self.make_token(TokenKind::DoubleColon)
                } else {
                    self.make_token(TokenKind::Colon)
                }
            }
            '<' => {
                if self.eat('=') {
                    self.make_token(TokenKind::LtEq)
                } else if self.eat('>') {
                    self.make_token(TokenKind::NotEq)
                } else {
                    self.make_token(TokenKind::Lt)
                }
            }
            '>' => {
                if self.eat('=') {
                    self.make_token(TokenKind::GtEq)
                } else {
                    self.make_token(TokenKind::Gt)
                }
            }
            '!' => {
                if self.eat('=') {
                    self.make_token(TokenKind::NotEq)
                } else if self.eat('~') {
                    if self.eat('*') {
                        self.make_token(TokenKind::NotTildeStar)
                    } else {
                        self.make_token(TokenKind::NotTilde)
                    }
                } else {
                    self.make_token(TokenKind::Error(String::from("unexpected character: !")))
                }
            }
            '~' => {
                if self.eat('*') {
                    self.make_token(TokenKind::TildeStar)
                } else {
                    self.make_token(TokenKind::Tilde)
                }
            }
            '?' => {
                if self.eat('~') {
                    if self.eat('*') {
                        self.make_token(TokenKind::QuestionTildeStar)
                    } else {
                        self.make_token(TokenKind::QuestionTilde)
                    }
                } else {
                    self.make_token(TokenKind::Placeholder)
                }
            }
            '|' => {
                if self.eat('|') {
                    self.make_token(TokenKind::Concat)
                } else {
                    self.make_token(TokenKind::Error(String::from("unexpected character: |")))
                }
            }
            '\'' => {
                self.pos = self.start + 1;
                self.scan_string()
            }
            '"' => self.scan_quoted('"', QuoteStyle::Double),
            '`' => self.scan_quoted('`', QuoteStyle::Backtick),
            c if c.is_ascii_digit() => {
                self.pos = self.start;
                self.scan_number()
            }
            c if c.is_alphabetic() || c == '_' => {
                self.pos = self.start;
                self.scan_identifier()
            }
            _ => self.make_token(TokenKind::Error(format!("unexpected character: {c}"))),
        }
    }

    /// Tokenizes the entire input.
    #[must_use]
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.is_eof();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
        assert_eq!(kinds("  \n\t "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("SELECT -- trailing\n a /* block */ ,"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Identifier("a".into()),
                TokenKind::Comma,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_regex_operators() {
        assert_eq!(
            kinds("a ~ b ~* c !~ d !~* e ?~ f ?~* g"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Tilde,
                TokenKind::Identifier("b".into()),
                TokenKind::TildeStar,
                TokenKind::Identifier("c".into()),
                TokenKind::NotTilde,
                TokenKind::Identifier("d".into()),
                TokenKind::NotTildeStar,
                TokenKind::Identifier("e".into()),
                TokenKind::QuestionTilde,
                TokenKind::Identifier("f".into()),
                TokenKind::QuestionTildeStar,
                TokenKind::Identifier("g".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            kinds("? :name"),
            vec![
                TokenKind::Placeholder,
                TokenKind::Colon,
                TokenKind::Identifier("name".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_cast_suffix() {
        assert_eq!(
            kinds("x::integer"),
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::DoubleColon,
                TokenKind::Identifier("integer".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_quoted_identifier_styles() {
        assert_eq!(
            kinds("\"a b\" `c`"),
            vec![
                TokenKind::Quoted("a b".into(), QuoteStyle::Double),
                TokenKind::Quoted("c".into(), QuoteStyle::Backtick),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_brackets_default_to_punctuation() {
        assert_eq!(
            kinds("[1, 2]"),
            vec![
                TokenKind::LeftBracket,
                TokenKind::Integer(1),
                TokenKind::Comma,
                TokenKind::Integer(2),
                TokenKind::RightBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_bracket_identifier_mode() {
        let options = LexerOptions { bracket_identifiers: true };
        let tokens: Vec<_> = Lexer::with_options("[order date]", options)
            .tokenize()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            tokens,
            vec![
                TokenKind::Quoted("order date".into(), QuoteStyle::Bracket),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.5 1e3 2.5e-1"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Float(3.5),
                TokenKind::Float(1e3),
                TokenKind::Float(2.5e-1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escape() {
        assert_eq!(
            kinds("'it''s'"),
            vec![TokenKind::String("it's".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_span_positions() {
        let tokens = Lexer::new("SELECT name").tokenize();
        assert_eq!(tokens[0].span, Span::new(0, 6));
        assert_eq!(tokens[1].span, Span::new(7, 11));
    }
}

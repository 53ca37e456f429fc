use super::token::{keyword, Span, Token, TokenType};

/// Pulls [`Token`]s out of a source string on demand. Holds no lookahead buffer beyond
/// the single character peek needed to scan multi-character lexemes.
pub struct Scanner<'a> {
    source: &'a [u8],
    start: usize,
    current: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            start: 0,
            current: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.current + 1).copied()
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn lexeme(&self) -> String {
        String::from_utf8_lossy(&self.source[self.start..self.current]).into_owned()
    }

    fn make(&self, typ: TokenType) -> Token {
        Token::new(typ, Span::new(self.start, self.current), String::new())
    }

    fn make_with_lexeme(&self, typ: TokenType) -> Token {
        Token::new(typ, Span::new(self.start, self.current), self.lexeme())
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\t' | b'\r' => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            self.advance();
        }
    }

    /// Content lexeme excludes both quotes; the token's span still covers them.
    fn string(&mut self) -> Token {
        let content_start = self.current;
        while let Some(c) = self.peek() {
            if c == b'"' {
                let content =
                    String::from_utf8_lossy(&self.source[content_start..self.current]).into_owned();
                self.advance();
                return Token::new(
                    TokenType::String,
                    Span::new(self.start, self.current),
                    content,
                );
            }
            if c == b'\n' {
                break;
            }
            self.advance();
        }
        // Unterminated: an ERROR token pinned to the open quote, not the whole run.
        Token::new(
            TokenType::Error,
            Span::new(self.start, self.start + 1),
            "\"".to_string(),
        )
    }

    fn number(&mut self) -> Token {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some(b'.') && matches!(self.peek_next(), Some(c) if c.is_ascii_digit()) {
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
            return self.make_with_lexeme(TokenType::Float);
        }

        self.make_with_lexeme(TokenType::Number)
    }

    fn ident(&mut self) -> Token {
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }

        let lexeme = self.lexeme();
        match keyword(&lexeme.to_ascii_lowercase()) {
            Some(typ) => self.make(typ),
            None => self.make_with_lexeme(TokenType::Ident),
        }
    }

    /// Returns the next token, or a sticky EOF once the source is exhausted.
    pub fn scan_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            self.start = self.current;

            if self.at_end() {
                return self.make(TokenType::Eof);
            }

            let c = self.advance();
            return match c {
                b'\n' => {
                    while self.peek() == Some(b'\n') {
                        self.advance();
                    }
                    self.make(TokenType::Break)
                }
                b',' => self.make(TokenType::Break),
                b'?' => self.make(TokenType::Question),
                b'!' => self.make(TokenType::Bang),
                b'"' => self.string(),
                b'0'..=b'9' => self.number(),
                c if c.is_ascii_alphabetic() || c == b'_' => {
                    if self.lexeme_is_btw(c) {
                        self.skip_line_comment();
                        continue;
                    }
                    self.ident()
                }
                _ => self.make_with_lexeme(TokenType::Error),
            };
        }
    }

    /// `BTW` only introduces a comment as a whole word; peek ahead before committing.
    fn lexeme_is_btw(&mut self, first: u8) -> bool {
        if !matches!(first, b'B' | b'b') {
            return false;
        }
        let save = self.current;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }
        let word = self.lexeme().to_ascii_lowercase();
        if word == "btw" {
            true
        } else {
            self.current = save;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(src: &str) -> Vec<TokenType> {
        let mut scanner = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let token = scanner.scan_token();
            let done = token.typ == TokenType::Eof;
            out.push(token.typ);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            scan_all("HAI KTHXBYE"),
            vec![TokenType::Hai, TokenType::Kthxbye, TokenType::Eof]
        );
        assert_eq!(
            scan_all("hai kthxbye"),
            vec![TokenType::Hai, TokenType::Kthxbye, TokenType::Eof]
        );
    }

    #[test]
    fn newlines_and_commas_collapse_to_one_break() {
        assert_eq!(
            scan_all("HAI\n\n\n1.0"),
            vec![
                TokenType::Hai,
                TokenType::Break,
                TokenType::Float,
                TokenType::Eof
            ]
        );
        assert_eq!(
            scan_all("HAI, 1"),
            vec![
                TokenType::Hai,
                TokenType::Break,
                TokenType::Number,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn comment_is_consumed_silently() {
        assert_eq!(
            scan_all("HAI BTW this is ignored\nKTHXBYE"),
            vec![
                TokenType::Hai,
                TokenType::Break,
                TokenType::Kthxbye,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn number_vs_float() {
        let mut scanner = Scanner::new("42 3.14 5.");
        assert_eq!(scanner.scan_token().typ, TokenType::Number);
        assert_eq!(scanner.scan_token().typ, TokenType::Float);
        let whole = scanner.scan_token();
        assert_eq!(whole.typ, TokenType::Number);
        assert_eq!(scanner.scan_token().typ, TokenType::Error);
    }

    #[test]
    fn unterminated_string_is_an_error_token_at_the_open_quote() {
        let mut scanner = Scanner::new("\"oh no");
        let token = scanner.scan_token();
        assert_eq!(token.typ, TokenType::Error);
        assert_eq!(token.span, Span::new(0, 1));
    }

    #[test]
    fn string_lexeme_excludes_quotes() {
        let mut scanner = Scanner::new("\"hello\"");
        let token = scanner.scan_token();
        assert_eq!(token.typ, TokenType::String);
        assert_eq!(token.lexeme, "hello");
    }

    #[test]
    fn ident_carries_original_lexeme() {
        let mut scanner = Scanner::new("MyVar");
        let token = scanner.scan_token();
        assert_eq!(token.typ, TokenType::Ident);
        assert_eq!(token.lexeme, "MyVar");
    }

    #[test]
    fn eof_is_sticky() {
        let mut scanner = Scanner::new("HAI");
        scanner.scan_token();
        assert_eq!(scanner.scan_token().typ, TokenType::Eof);
        assert_eq!(scanner.scan_token().typ, TokenType::Eof);
    }
}

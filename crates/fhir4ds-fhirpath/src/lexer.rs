//! Hand-written lexer (spec §4.2).
//!
//! Recognizes identifiers (including the backtick-escaped form), the four
//! literal families, the symbolic and word operators, and the `$`-prefixed
//! variable tokens. Produces 1-based line/column positions on error via
//! [`fhir4ds_support::position::line_col`].

use fhir4ds_support::{LexError, SourcePosition};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    BacktickIdentifier(String),
    Integer(String),
    Decimal(String),
    String(String),
    Boolean(bool),
    DateLiteral(String),
    DateTimeLiteral(String),
    TimeLiteral(String),
    Variable(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Pipe,
    Ampersand,
    Bang,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Tilde,
    NotTilde,
    And,
    Or,
    Xor,
    Implies,
    Mod,
    Div,
    In,
    Contains,
    Is,
    As,
    Not,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: SourcePosition,
    pub text: String,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    index: usize,
}

const WORD_OPERATORS: &[(&str, fn() -> TokenKind)] = &[
    ("and", || TokenKind::And),
    ("or", || TokenKind::Or),
    ("xor", || TokenKind::Xor),
    ("implies", || TokenKind::Implies),
    ("mod", || TokenKind::Mod),
    ("div", || TokenKind::Div),
    ("in", || TokenKind::In),
    ("contains", || TokenKind::Contains),
    ("is", || TokenKind::Is),
    ("as", || TokenKind::As),
    ("not", || TokenKind::Not),
    ("true", || TokenKind::Boolean(true)),
    ("false", || TokenKind::Boolean(false)),
];

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            index: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.is_eof() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    position: self.position_at(self.index),
                    text: String::new(),
                });
                break;
            }
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn is_eof(&self) -> bool {
        self.index >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.index += 1;
        }
        c
    }

    fn position_at(&self, char_index: usize) -> SourcePosition {
        let byte_index: usize = self.chars[..char_index.min(self.chars.len())]
            .iter()
            .map(|c| c.len_utf8())
            .sum();
        SourcePosition::from_index(self.source, byte_index)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let start = self.index;
        let position = self.position_at(start);
        let c = self.peek().expect("checked by caller");

        let kind = match c {
            '`' => self.lex_backtick()?,
            '\'' => self.lex_string()?,
            '@' => self.lex_temporal_literal()?,
            '$' => self.lex_variable(),
            '.' => {
                self.advance();
                TokenKind::Dot
            }
            ',' => {
                self.advance();
                TokenKind::Comma
            }
            '(' => {
                self.advance();
                TokenKind::LParen
            }
            ')' => {
                self.advance();
                TokenKind::RParen
            }
            '[' => {
                self.advance();
                TokenKind::LBracket
            }
            ']' => {
                self.advance();
                TokenKind::RBracket
            }
            '{' => {
                self.advance();
                TokenKind::LBrace
            }
            '}' => {
                self.advance();
                TokenKind::RBrace
            }
            '|' => {
                self.advance();
                TokenKind::Pipe
            }
            '&' => {
                self.advance();
                TokenKind::Ampersand
            }
            '+' => {
                self.advance();
                TokenKind::Plus
            }
            '-' => {
                self.advance();
                TokenKind::Minus
            }
            '*' => {
                self.advance();
                TokenKind::Star
            }
            '/' => {
                self.advance();
                TokenKind::Slash
            }
            '=' => {
                self.advance();
                TokenKind::Eq
            }
            '!' => {
                self.advance();
                match self.peek() {
                    Some('=') => {
                        self.advance();
                        TokenKind::NotEq
                    }
                    Some('~') => {
                        self.advance();
                        TokenKind::NotTilde
                    }
                    _ => TokenKind::Bang,
                }
            }
            '~' => {
                self.advance();
                TokenKind::Tilde
            }
            '<' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            c if c.is_ascii_digit() => self.lex_number(),
            c if c.is_alphabetic() || c == '_' => self.lex_word(),
            other => {
                return Err(LexError::UnknownCharacter {
                    character: other,
                    position,
                });
            }
        };

        let text: String = self.chars[start..self.index].iter().collect();
        Ok(Token { kind, position, text })
    }

    fn lex_backtick(&mut self) -> Result<TokenKind, LexError> {
        let start_pos = self.position_at(self.index);
        self.advance();
        let mut name = String::new();
        loop {
            match self.advance() {
                Some('`') => return Ok(TokenKind::BacktickIdentifier(name)),
                Some(c) => name.push(c),
                None => return Err(LexError::UnterminatedBacktick { position: start_pos }),
            }
        }
    }

    fn lex_string(&mut self) -> Result<TokenKind, LexError> {
        let start_pos = self.position_at(self.index);
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        self.advance();
                        value.push('\'');
                    } else {
                        return Ok(TokenKind::String(value));
                    }
                }
                Some('\\') => {
                    if let Some(escaped) = self.advance() {
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                    } else {
                        return Err(LexError::UnterminatedString { position: start_pos });
                    }
                }
                Some(c) => value.push(c),
                None => return Err(LexError::UnterminatedString { position: start_pos }),
            }
        }
    }

    fn lex_temporal_literal(&mut self) -> Result<TokenKind, LexError> {
        self.advance(); // consume '@'
        let start = self.index;
        if self.peek() == Some('T') {
            self.advance();
            while self.peek().is_some_and(is_temporal_char) {
                self.advance();
            }
            let text: String = self.chars[start..self.index].iter().collect();
            return Ok(TokenKind::TimeLiteral(text));
        }
        while self.peek().is_some_and(is_temporal_char) {
            self.advance();
        }
        let text: String = self.chars[start..self.index].iter().collect();
        if text.contains('T') {
            Ok(TokenKind::DateTimeLiteral(text))
        } else {
            Ok(TokenKind::DateLiteral(text))
        }
    }

    fn lex_variable(&mut self) -> TokenKind {
        self.advance(); // consume '$'
        let start = self.index;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let name: String = self.chars[start..self.index].iter().collect();
        TokenKind::Variable(name)
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.index;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
            let text: String = self.chars[start..self.index].iter().collect();
            TokenKind::Decimal(text)
        } else {
            let text: String = self.chars[start..self.index].iter().collect();
            TokenKind::Integer(text)
        }
    }

    fn lex_word(&mut self) -> TokenKind {
        let start = self.index;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let word: String = self.chars[start..self.index].iter().collect();
        for (name, make) in WORD_OPERATORS {
            if word == *name {
                return make();
            }
        }
        TokenKind::Identifier(word)
    }
}

fn is_temporal_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '-' | ':' | '.' | 'T' | 'Z' | '+')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_simple_path() {
        let tokens = kinds("Patient.name.given");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier("Patient".into()),
                TokenKind::Dot,
                TokenKind::Identifier("name".into()),
                TokenKind::Dot,
                TokenKind::Identifier("given".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_string_with_doubled_quote_escape() {
        let tokens = kinds("'x''y'");
        assert_eq!(tokens[0], TokenKind::String("x'y".into()));
    }

    #[test]
    fn tokenizes_backtick_identifier() {
        let tokens = kinds("`$this`");
        assert_eq!(tokens[0], TokenKind::BacktickIdentifier("$this".into()));
    }

    #[test]
    fn tokenizes_time_literal_without_timezone() {
        let tokens = kinds("@T12:14:15");
        assert_eq!(tokens[0], TokenKind::TimeLiteral("T12:14:15".into()));
    }

    #[test]
    fn tokenizes_datetime_literal_with_timezone() {
        let tokens = kinds("@2021-01-01T10:00:00Z");
        assert_eq!(
            tokens[0],
            TokenKind::DateTimeLiteral("2021-01-01T10:00:00Z".into())
        );
    }

    #[test]
    fn tokenizes_variable_tokens() {
        assert_eq!(kinds("$this")[0], TokenKind::Variable("this".into()));
        assert_eq!(kinds("$total")[0], TokenKind::Variable("total".into()));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = Lexer::new("'abc").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
    }

    #[test]
    fn unknown_character_is_an_error() {
        let err = Lexer::new("Patient.name % foo").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnknownCharacter { character: '%', .. }));
    }
}

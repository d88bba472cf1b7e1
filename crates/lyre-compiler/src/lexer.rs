//! Pull-based lexer. The parser peeks at `current()` and consumes with
//! `advance()`.

use crate::token::{Span, SpannedToken, Token};
use std::fmt;

/// Lexer error.
#[derive(Clone, Debug, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: u32,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Syntax error] At line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LexError {}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    /// Lookahead character.
    ch: Option<char>,
    line: u32,
    current: Option<Result<SpannedToken, LexError>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.char_indices();
        let ch = chars.next().map(|(_, c)| c);
        let mut lexer = Lexer {
            source,
            chars,
            ch,
            line: 1,
            current: None,
        };
        // Prime the first token
        lexer.current = Some(lexer.scan_token());
        lexer
    }

    pub fn source(&self) -> &str {
        self.source
    }

    /// Peek at the current token without consuming.
    pub fn current(&self) -> Result<&SpannedToken, &LexError> {
        match &self.current {
            Some(Ok(tok)) => Ok(tok),
            Some(Err(e)) => Err(e),
            None => unreachable!("lexer should always have a current token"),
        }
    }

    /// Consume the current token and advance to the next one.
    pub fn advance(&mut self) -> Result<SpannedToken, LexError> {
        let prev = match self.current.take() {
            Some(tok) => tok,
            None => unreachable!("lexer should always have a current token"),
        };
        self.current = Some(self.scan_token());
        prev
    }

    // ---- Internal scanning ----

    fn bump(&mut self) -> Option<char> {
        let ch = self.ch?;
        self.ch = self.chars.next().map(|(_, c)| c);
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            line: self.line,
        }
    }

    fn skip_blanks(&mut self) {
        loop {
            match self.ch {
                // Newlines are tokens, not whitespace.
                Some(' ') | Some('\t') | Some('\r') => {
                    self.bump();
                }
                // A '#' comment runs to the end of the line.
                Some('#') => {
                    while let Some(c) = self.ch {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_token(&mut self) -> Result<SpannedToken, LexError> {
        self.skip_blanks();
        let line = self.line;
        let span = Span { line };

        let ch = match self.ch {
            Some(c) => c,
            None => {
                return Ok(SpannedToken {
                    token: Token::Eot,
                    span,
                })
            }
        };

        if ch.is_alphabetic() {
            return Ok(SpannedToken {
                token: self.scan_identifier(),
                span,
            });
        }
        if ch.is_ascii_digit() {
            let token = self.scan_number()?;
            return Ok(SpannedToken { token, span });
        }

        let token = match ch {
            '\n' => {
                self.bump();
                // report the line the statement ended on
                return Ok(SpannedToken {
                    token: Token::Eol,
                    span: Span { line },
                });
            }
            '"' | '\'' => {
                let s = self.scan_string(ch)?;
                Token::Str(s)
            }
            '(' => {
                self.bump();
                Token::LParen
            }
            ')' => {
                self.bump();
                Token::RParen
            }
            '[' => {
                self.bump();
                Token::LBracket
            }
            ']' => {
                self.bump();
                Token::RBracket
            }
            '{' => {
                self.bump();
                Token::LBrace
            }
            '}' => {
                self.bump();
                Token::RBrace
            }
            ',' => {
                self.bump();
                Token::Comma
            }
            ';' => {
                self.bump();
                Token::Semi
            }
            ':' => {
                self.bump();
                Token::Colon
            }
            '.' => {
                self.bump();
                Token::Dot
            }
            '@' => {
                self.bump();
                Token::OpAt
            }
            '+' => self.op_or_assign(Token::OpPlus, Token::OpAssignPlus),
            '-' => self.op_or_assign(Token::OpMinus, Token::OpAssignMinus),
            '*' => self.op_or_assign(Token::OpStar, Token::OpAssignStar),
            '/' => self.op_or_assign(Token::OpSlash, Token::OpAssignSlash),
            '%' => self.op_or_assign(Token::OpMod, Token::OpAssignMod),
            '^' => self.op_or_assign(Token::OpPower, Token::OpAssignPower),
            '&' => self.op_or_assign(Token::OpConcat, Token::OpAssignConcat),
            '=' => self.op_or_assign(Token::OpAssign, Token::OpEqual),
            '!' => {
                self.bump();
                if self.ch == Some('=') {
                    self.bump();
                    Token::OpNotEqual
                } else {
                    return Err(self.error("invalid token '!'"));
                }
            }
            '<' => {
                self.bump();
                if self.ch == Some('=') {
                    self.bump();
                    if self.ch == Some('>') {
                        self.bump();
                        Token::OpCompare
                    } else {
                        Token::OpLessEqual
                    }
                } else {
                    Token::OpLess
                }
            }
            '>' => {
                self.bump();
                if self.ch == Some('=') {
                    self.bump();
                    Token::OpGreaterEqual
                } else {
                    Token::OpGreater
                }
            }
            other => return Err(self.error(format!("invalid token '{other}'"))),
        };
        Ok(SpannedToken { token, span })
    }

    fn op_or_assign(&mut self, plain: Token, with_eq: Token) -> Token {
        self.bump();
        if self.ch == Some('=') {
            self.bump();
            with_eq
        } else {
            plain
        }
    }

    fn scan_identifier(&mut self) -> Token {
        let mut text = String::new();
        while let Some(c) = self.ch {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // Identifiers may end with '$', conventionally marking symbols
        // reserved for implementation details (e.g. the init$ constructor).
        while self.ch == Some('$') {
            text.push('$');
            self.bump();
        }
        match Token::keyword_from_str(&text) {
            Some(kw) => kw,
            None => Token::Ident(text),
        }
    }

    fn scan_number(&mut self) -> Result<Token, LexError> {
        let mut text = String::new();
        while let Some(c) = self.ch {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.ch == Some('.') {
            text.push('.');
            self.bump();
            while let Some(c) = self.ch {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            return match text.parse::<f64>() {
                Ok(x) => Ok(Token::Float(x)),
                Err(_) => Err(self.error(format!("invalid number '{text}'"))),
            };
        }
        match text.parse::<i64>() {
            Ok(i) => Ok(Token::Integer(i)),
            // out of integer range, fall back to float
            Err(_) => match text.parse::<f64>() {
                Ok(x) => Ok(Token::Float(x)),
                Err(_) => Err(self.error(format!("invalid number '{text}'"))),
            },
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<String, LexError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => return Err(self.error("unterminated string")),
            };
            if c == quote {
                return Ok(text);
            }
            if c == '\\' {
                let esc = match self.bump() {
                    Some(e) => e,
                    None => return Err(self.error("unterminated string")),
                };
                match esc {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '\\' => text.push('\\'),
                    '\'' => text.push('\''),
                    '"' => text.push('"'),
                    'a' => text.push('\x07'),
                    'b' => text.push('\x08'),
                    'f' => text.push('\x0C'),
                    'v' => text.push('\x0B'),
                    other => {
                        return Err(self.error(format!("invalid escape sequence '\\{other}'")))
                    }
                }
            } else {
                text.push(c);
            }
        }
    }
}

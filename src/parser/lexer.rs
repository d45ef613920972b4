//! Query lexer.
//!
//! Commas, whitespace, the byte order mark and `#` comments are insignificant.
use std::fmt;

use crate::error::{Pos, SyntaxError};

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Name(String),
    /// `$name`
    Variable(String),
    Int(i64),
    Float(f64),
    /// Quoted or block string, escapes already processed.
    String(String),
    Bang,
    Amp,
    LParen,
    RParen,
    Spread,
    Colon,
    Equals,
    At,
    LBracket,
    RBracket,
    LBrace,
    Pipe,
    RBrace,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "Name \"{name}\""),
            Self::Variable(name) => write!(f, "Variable \"${name}\""),
            Self::Int(value) => write!(f, "Int \"{value}\""),
            Self::Float(value) => write!(f, "Float \"{value}\""),
            Self::String(value) => write!(f, "String {}", serde_json::Value::from(value.as_str())),
            Self::Bang => f.write_str("\"!\""),
            Self::Amp => f.write_str("\"&\""),
            Self::LParen => f.write_str("\"(\""),
            Self::RParen => f.write_str("\")\""),
            Self::Spread => f.write_str("\"...\""),
            Self::Colon => f.write_str("\":\""),
            Self::Equals => f.write_str("\"=\""),
            Self::At => f.write_str("\"@\""),
            Self::LBracket => f.write_str("\"[\""),
            Self::RBracket => f.write_str("\"]\""),
            Self::LBrace => f.write_str("\"{\""),
            Self::Pipe => f.write_str("\"|\""),
            Self::RBrace => f.write_str("\"}\""),
            Self::Eof => f.write_str("<EOF>"),
        }
    }
}

/// A token and the position it starts at.
#[derive(Clone, Debug)]
pub struct Spanned {
    pub token: Token,
    pub pos: Pos,
}

pub struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_name_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, offset: 0, line: 1, column: 1 }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn pos(&self) -> Pos {
        Pos { line: self.line, column: self.column }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            // A lone `\r` ends a line; in `\r\n` the `\n` does.
            '\r' if self.peek() != Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            _ => self.column += 1,
        }
        Some(c)
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn skip_ignored(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | ',' | '\n' | '\r' | '\u{feff}' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned, SyntaxError> {
        self.skip_ignored();
        let pos = self.pos();
        let Some(c) = self.peek() else {
            return Ok(Spanned { token: Token::Eof, pos });
        };
        let token = match c {
            '!' => self.punct(Token::Bang),
            '&' => self.punct(Token::Amp),
            '(' => self.punct(Token::LParen),
            ')' => self.punct(Token::RParen),
            ':' => self.punct(Token::Colon),
            '=' => self.punct(Token::Equals),
            '@' => self.punct(Token::At),
            '[' => self.punct(Token::LBracket),
            ']' => self.punct(Token::RBracket),
            '{' => self.punct(Token::LBrace),
            '|' => self.punct(Token::Pipe),
            '}' => self.punct(Token::RBrace),
            '.' => {
                if !self.rest().starts_with("...") {
                    return Err(SyntaxError::new("Unexpected \".\", did you mean \"...\"?", pos));
                }
                self.advance_by(3);
                Token::Spread
            }
            '$' => {
                self.bump();
                match self.peek() {
                    Some(c) if is_name_start(c) => Token::Variable(self.name()),
                    _ => return Err(SyntaxError::new("Expected a variable name after \"$\"", pos)),
                }
            }
            '"' => self.string(pos)?,
            c if c == '-' || c.is_ascii_digit() => self.number(pos)?,
            c if is_name_start(c) => Token::Name(self.name()),
            other => return Err(SyntaxError::new(format!("Unexpected character {other:?}"), pos)),
        };
        Ok(Spanned { token, pos })
    }

    fn punct(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn name(&mut self) -> String {
        let start = self.offset;
        while self.peek().is_some_and(is_name_continue) {
            self.bump();
        }
        self.source[start..self.offset].to_string()
    }

    fn digits(&mut self, pos: Pos) -> Result<(), SyntaxError> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {}
            Some(c) => return Err(SyntaxError::new(format!("Invalid number, expected digit but got {c:?}"), pos)),
            None => return Err(SyntaxError::new("Invalid number, expected digit but got <EOF>", pos)),
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        Ok(())
    }

    fn number(&mut self, pos: Pos) -> Result<Token, SyntaxError> {
        let start = self.offset;
        if self.peek() == Some('-') {
            self.bump();
        }
        if self.peek() == Some('0') {
            self.bump();
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(SyntaxError::new("Invalid number, unexpected digit after 0", pos));
            }
        } else {
            self.digits(pos)?;
        }

        let mut is_float = false;
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            self.digits(pos)?;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            self.digits(pos)?;
        }
        if let Some(c) = self.peek().filter(|c| *c == '.' || is_name_start(*c)) {
            return Err(SyntaxError::new(format!("Invalid number, expected digit but got {c:?}"), pos));
        }

        let text = &self.source[start..self.offset];
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| SyntaxError::new(format!("Invalid number {text}"), pos))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| SyntaxError::new(format!("Int cannot represent value {text}"), pos))
        }
    }

    fn string(&mut self, pos: Pos) -> Result<Token, SyntaxError> {
        if self.rest().starts_with("\"\"\"") {
            return self.block_string(pos);
        }
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n' | '\r') => return Err(SyntaxError::new("Unterminated string", pos)),
                Some('"') => return Ok(Token::String(out)),
                Some('\\') => {
                    let escape_pos = self.pos();
                    let c = match self.bump() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('/') => '/',
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('u') => self.unicode(escape_pos)?,
                        _ => return Err(SyntaxError::new("Invalid escape sequence", escape_pos)),
                    };
                    out.push(c);
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn hex4(&mut self, pos: Pos) -> Result<u32, SyntaxError> {
        let digits = self.rest().get(..4).filter(|d| d.chars().all(|c| c.is_ascii_hexdigit()));
        let value = digits
            .and_then(|d| u32::from_str_radix(d, 16).ok())
            .ok_or_else(|| SyntaxError::new("Invalid unicode escape sequence", pos))?;
        self.advance_by(4);
        Ok(value)
    }

    fn unicode(&mut self, pos: Pos) -> Result<char, SyntaxError> {
        let high = self.hex4(pos)?;
        let code = if (0xD800..=0xDBFF).contains(&high) {
            if !self.rest().starts_with("\\u") {
                return Err(SyntaxError::new("Invalid unicode escape sequence: unpaired surrogate", pos));
            }
            self.advance_by(2);
            let low = self.hex4(pos)?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return Err(SyntaxError::new("Invalid unicode escape sequence: unpaired surrogate", pos));
            }
            0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
        } else {
            high
        };
        char::from_u32(code).ok_or_else(|| SyntaxError::new("Invalid unicode escape sequence", pos))
    }

    fn block_string(&mut self, pos: Pos) -> Result<Token, SyntaxError> {
        self.advance_by(3);
        let mut raw = String::new();
        loop {
            if self.rest().starts_with("\\\"\"\"") {
                raw.push_str("\"\"\"");
                self.advance_by(4);
            } else if self.rest().starts_with("\"\"\"") {
                self.advance_by(3);
                return Ok(Token::String(block_string_value(&raw)));
            } else {
                match self.bump() {
                    Some(c) => raw.push(c),
                    None => return Err(SyntaxError::new("Unterminated string", pos)),
                }
            }
        }
    }
}

/// Strips the common indentation and the leading/trailing blank lines of a block string.
fn block_string_value(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();

    let indent_of = |line: &str| line.len() - line.trim_start_matches([' ', '\t']).len();
    let common = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim_start_matches([' ', '\t']).is_empty())
        .map(|line| indent_of(*line))
        .min()
        .unwrap_or(0);

    let mut out: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| if i == 0 { *line } else { line.get(common..).unwrap_or("") })
        .collect();
    let blank = |line: &&str| line.trim_matches([' ', '\t']).is_empty();
    while out.first().is_some_and(blank) {
        out.remove(0);
    }
    while out.last().is_some_and(blank) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let next = lexer.next_token().unwrap();
            if next.token == Token::Eof {
                return out;
            }
            out.push(next.token);
        }
    }

    #[test]
    fn punctuation_and_names() {
        assert_eq!(
            tokens("query($id: ID!) { ...F, a: b @skip }"),
            vec![
                Token::Name("query".into()),
                Token::LParen,
                Token::Variable("id".into()),
                Token::Colon,
                Token::Name("ID".into()),
                Token::Bang,
                Token::RParen,
                Token::LBrace,
                Token::Spread,
                Token::Name("F".into()),
                Token::Name("a".into()),
                Token::Colon,
                Token::Name("b".into()),
                Token::At,
                Token::Name("skip".into()),
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn comments_are_ignored_and_positions_tracked() {
        let mut lexer = Lexer::new("# heading\n  hello");
        let token = lexer.next_token().unwrap();
        assert_eq!(token.token, Token::Name("hello".into()));
        assert_eq!(token.pos, Pos { line: 2, column: 3 });
    }

    #[test]
    fn numbers() {
        assert_eq!(tokens("0 -12 3.5 1e3 -0.25E-2"), vec![
            Token::Int(0),
            Token::Int(-12),
            Token::Float(3.5),
            Token::Float(1000.0),
            Token::Float(-0.0025),
        ]);
        assert!(Lexer::new("012").next_token().is_err());
        assert!(Lexer::new("1.").next_token().is_err());
        assert!(Lexer::new("3x").next_token().is_err());
        assert!(Lexer::new("99999999999999999999").next_token().is_err());
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(tokens(r#""a\"b\n\u00e9\uD83D\uDE00""#), vec![Token::String("a\"b\n\u{e9}\u{1F600}".into())]);
        assert!(Lexer::new("\"open").next_token().is_err());
        assert!(Lexer::new("\"bad \\q\"").next_token().is_err());
    }

    #[test]
    fn block_strings_drop_common_indent() {
        let source = "\"\"\"\n    Hello,\n      World!\n\n    Yours, \\\"\"\"\n  \"\"\"";
        assert_eq!(tokens(source), vec![Token::String("Hello,\n  World!\n\nYours, \"\"\"".into())]);
    }

    #[test]
    fn stray_characters() {
        let err = Lexer::new("  %").next_token().unwrap_err();
        assert_eq!(err.pos, Pos { line: 1, column: 3 });
        assert!(Lexer::new("..").next_token().is_err());
        assert!(Lexer::new("$ x").next_token().is_err());
    }
}

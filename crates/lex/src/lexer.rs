use anyhow::{bail, Result};

use crate::keywords::classify_word;
use crate::token::{Punctuator as P, Span, Token, TokenKind as K};

// Longest match first: every two-character operator is tried before
// the single-character table.
const TWO_CHAR_PUNCTS: [(&str, P); 9] = [
    ("==", P::Eq),
    ("!=", P::Ne),
    ("<=", P::Le),
    (">=", P::Ge),
    ("++", P::Inc),
    ("--", P::Dec),
    ("->", P::Arrow),
    ("||", P::OrOr),
    ("&&", P::AndAnd),
];

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }
    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }
    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }
    fn starts_with(&self, s: &str) -> bool {
        self.bytes
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(s.as_bytes()))
    }
    fn token(&self, kind: K, start: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.src[start..self.pos],
            span: Span {
                start,
                end: self.pos,
            },
        }
    }

    /// 1-based line and column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        line_col(self.src, offset)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.starts_with("//") {
                self.skip_line();
                continue;
            }
            if self.starts_with("/*") {
                let start = self.pos;
                match self.src[self.pos + 2..].find("*/") {
                    Some(end) => self.pos += 2 + end + 2,
                    None => {
                        let (line, col) = self.line_col(start);
                        bail!("unclosed comment starting at {}:{}", line, col);
                    }
                }
                continue;
            }
            // preprocessor directives are dropped up to the end of the line
            if self.peek() == Some(b'#') {
                self.skip_line();
                continue;
            }
            // `const` is accepted and ignored
            if self.starts_with("const") && self.peek_at(5).is_some_and(|c| c.is_ascii_whitespace()) {
                self.pos += 5;
                continue;
            }
            return Ok(());
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn fail_at(&self, pos: usize, what: &str) -> anyhow::Error {
        let (line, col) = self.line_col(pos);
        let shown = self.src.get(pos..).and_then(|s| s.chars().next()).unwrap_or(' ');
        anyhow::anyhow!("failed to tokenize at '{}' ({}:{}): {}", shown, line, col, what)
    }

    /// Produce the next token; returns `Eof` (repeatedly) once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(self.token(K::Eof, start));
        };

        for (s, p) in TWO_CHAR_PUNCTS {
            if self.starts_with(s) {
                self.pos += 2;
                return Ok(self.token(K::Punct(p), start));
            }
        }
        let single = match c {
            b'+' => Some(P::Plus),
            b'-' => Some(P::Minus),
            b'*' => Some(P::Star),
            b'/' => Some(P::Slash),
            b'%' => Some(P::Percent),
            b'>' => Some(P::Gt),
            b'<' => Some(P::Lt),
            b'(' => Some(P::LParen),
            b')' => Some(P::RParen),
            b'[' => Some(P::LBracket),
            b']' => Some(P::RBracket),
            b'=' => Some(P::Assign),
            b';' => Some(P::Semicolon),
            b'{' => Some(P::LBrace),
            b'}' => Some(P::RBrace),
            b',' => Some(P::Comma),
            b'&' => Some(P::Amp),
            b'.' => Some(P::Dot),
            b'|' => Some(P::Pipe),
            b'!' => Some(P::Bang),
            b'^' => Some(P::Caret),
            _ => None,
        };
        if let Some(p) = single {
            self.pos += 1;
            return Ok(self.token(K::Punct(p), start));
        }

        if c.is_ascii_alphabetic() {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
                self.pos += 1;
            }
            let kind = classify_word(&self.src[start..self.pos]);
            return Ok(self.token(kind, start));
        }

        if c.is_ascii_digit() {
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
            let digits = &self.src[start..self.pos];
            // anything a 32-bit register holds; 2147483648 and up wrap so that
            // `-2147483648` and `4294967295` keep their bit patterns
            let Ok(value) = digits.parse::<u32>() else {
                return Err(self.fail_at(start, "integer literal out of range"));
            };
            return Ok(self.token(K::Int(value as i32), start));
        }

        if c == b'\'' {
            return self.char_literal(start);
        }

        if c == b'"' {
            self.pos += 1;
            loop {
                match self.bump() {
                    Some(b'\\') => {
                        let _ = self.bump();
                    }
                    Some(b'"') => break,
                    Some(_) => {}
                    None => return Err(self.fail_at(start, "unterminated string literal")),
                }
            }
            return Ok(self.token(K::Str, start));
        }

        Err(self.fail_at(start, "unexpected character"))
    }

    fn char_literal(&mut self, start: usize) -> Result<Token<'a>> {
        self.pos += 1; // opening '
        let value = match self.bump() {
            Some(b'\\') => {
                let esc_pos = self.pos;
                match self.bump() {
                    Some(b'0') => 0,
                    Some(b'a') => 7,
                    Some(b'b') => 8,
                    Some(b'f') => 12,
                    Some(b'n') => 10,
                    Some(b't') => 9,
                    Some(b'\\') => b'\\' as i32,
                    Some(b'\'') => b'\'' as i32,
                    _ => return Err(self.fail_at(esc_pos, "unknown escape in character literal")),
                }
            }
            Some(c) => c as i32,
            None => return Err(self.fail_at(start, "unterminated character literal")),
        };
        if self.peek() != Some(b'\'') {
            return Err(self.fail_at(self.pos, "expected closing quote of character literal"));
        }
        self.pos += 1;
        Ok(self.token(K::Int(value), start))
    }
}

pub fn line_col(src: &str, offset: usize) -> (usize, usize) {
    let before = &src.as_bytes()[..offset.min(src.len())];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let col = before.iter().rev().take_while(|&&b| b != b'\n').count() + 1;
    (line, col)
}

/// Tokenize the whole buffer. The returned sequence always ends with a single `Eof` token.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>> {
    let mut lx = Lexer::new(src);
    let mut toks = Vec::new();
    loop {
        let tok = lx.next_token()?;
        let done = tok.kind == K::Eof;
        toks.push(tok);
        if done {
            return Ok(toks);
        }
    }
}

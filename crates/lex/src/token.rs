#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Break,
    Char,
    Continue,
    Else,
    For,
    If,
    /// `int`, and the `size_t`/`bool` spellings that alias it.
    Int,
    Return,
    Sizeof,
    Struct,
    Typedef,
    Void,
    While,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuator {
    LParen, RParen,
    LBrace, RBrace,
    LBracket, RBracket,
    Semicolon, Comma, Dot,
    Arrow,
    Plus, Minus, Star, Slash, Percent,
    Inc, Dec,
    Amp, Pipe, Caret, Bang,
    Assign,
    Lt, Gt, Le, Ge, Eq, Ne,
    AndAnd, OrOr,
}

impl Punctuator {
    pub fn as_str(self) -> &'static str {
        use Punctuator as P;
        match self {
            P::LParen => "(",
            P::RParen => ")",
            P::LBrace => "{",
            P::RBrace => "}",
            P::LBracket => "[",
            P::RBracket => "]",
            P::Semicolon => ";",
            P::Comma => ",",
            P::Dot => ".",
            P::Arrow => "->",
            P::Plus => "+",
            P::Minus => "-",
            P::Star => "*",
            P::Slash => "/",
            P::Percent => "%",
            P::Inc => "++",
            P::Dec => "--",
            P::Amp => "&",
            P::Pipe => "|",
            P::Caret => "^",
            P::Bang => "!",
            P::Assign => "=",
            P::Lt => "<",
            P::Gt => ">",
            P::Le => "<=",
            P::Ge => ">=",
            P::Eq => "==",
            P::Ne => "!=",
            P::AndAnd => "&&",
            P::OrOr => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Punct(Punctuator),
    Keyword(Keyword),
    Identifier,
    /// Decimal or character literal (and `NULL`), already decoded.
    Int(i32),
    /// String literal; the token text keeps the quotes and escapes verbatim.
    Str,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A token borrowing its text from the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub span: Span,
}

impl Token<'_> {
    pub fn is_punct(&self, p: Punctuator) -> bool {
        self.kind == TokenKind::Punct(p)
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.kind == TokenKind::Keyword(kw)
    }
}

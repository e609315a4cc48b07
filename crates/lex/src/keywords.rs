use crate::token::{Keyword, TokenKind};

/// Classify an identifier spelling. `NULL` lexes as the integer literal 0.
pub fn classify_word(word: &str) -> TokenKind {
    let kw = match word {
        "return" => Keyword::Return,
        "break" => Keyword::Break,
        "continue" => Keyword::Continue,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "while" => Keyword::While,
        "for" => Keyword::For,
        "int" | "size_t" | "bool" => Keyword::Int,
        "char" => Keyword::Char,
        "void" => Keyword::Void,
        "typedef" => Keyword::Typedef,
        "struct" => Keyword::Struct,
        "sizeof" => Keyword::Sizeof,
        "NULL" => return TokenKind::Int(0),
        _ => return TokenKind::Identifier,
    };
    TokenKind::Keyword(kw)
}

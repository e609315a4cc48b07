pub mod keywords;
mod lexer;
pub mod token;

pub use lexer::{line_col, tokenize, Lexer};
pub use token::{Keyword, Punctuator, Span, Token, TokenKind};

//! GraphQL lexical analysis, October 2021 edition.

mod lexer;
mod token_kind;

pub use lexer::lex;
pub use token_kind::{Keyword, TokenKind};

//! Parser
//!
//! Lexer, word sub-grammars, arithmetic parser and the recursive-descent
//! statement parser. `parse` is the single entry point: source text in,
//! AST out, never executing anything. All syntax failures surface as
//! [`ParseError`] and reach the host as exit status 2.

pub mod arith;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;
mod word;

use thiserror::Error;

pub use parser::{parse, Parser};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("syntax error near unexpected token `{token}'")]
    Unexpected { token: String, line: u32 },
    #[error("syntax error: unexpected end of file")]
    UnexpectedEof,
}

impl ParseError {
    pub fn unexpected(token: String, line: u32) -> Self {
        let token = if token.is_empty() { "newline".to_string() } else { token };
        ParseError::Unexpected { token, line }
    }
}

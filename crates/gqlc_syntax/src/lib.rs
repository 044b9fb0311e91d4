//! Executable GraphQL documents for gqlc.
//!
//! This crate provides:
//! - `token`: Token kinds and token structures
//! - `lexer`: Tokenization
//! - `ast`: Owned abstract syntax tree types
//! - `parser`: Recursive descent parser
//! - `printer`: Source printing

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod span;
pub mod token;

pub use ast::*;
pub use error::{SyntaxError, SyntaxResult};
pub use lexer::Lexer;
pub use parser::{parse, Parser};
pub use printer::{print, PrintOptions, Printer};
pub use span::Span;
pub use token::{Token, TokenKind};

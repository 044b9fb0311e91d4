//! Syntax errors raised while reading a query document.

use crate::span::Span;
use miette::SourceSpan;
use thiserror::Error;

/// Diagnostic codes reported by the parser.
pub mod codes {
    pub const UNEXPECTED_TOKEN: &str = "gqlc::syntax::unexpected_token";
    pub const UNTERMINATED_STRING: &str = "gqlc::syntax::unterminated_string";
    pub const INVALID_NUMBER: &str = "gqlc::syntax::invalid_number";
    pub const INVALID_CHARACTER: &str = "gqlc::syntax::invalid_character";
    pub const EMPTY_DOCUMENT: &str = "gqlc::syntax::empty_document";
}

/// An error found while lexing or parsing a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    /// Human readable description.
    pub message: String,
    /// Diagnostic code, one of [`codes`].
    pub code: &'static str,
    /// Location of the offending token.
    pub location: SourceSpan,
}

impl SyntaxError {
    /// Creates a new syntax error at a span.
    pub fn new(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            code,
            location: span.into(),
        }
    }

    /// Returns the span of the error.
    #[must_use]
    pub fn span(&self) -> Span {
        let start = self.location.offset() as u32;
        Span::new(start, start + self.location.len() as u32)
    }
}

impl miette::Diagnostic for SyntaxError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        Some(Box::new(self.code))
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(miette::LabeledSpan::new_with_span(
            Some("here".to_string()),
            self.location,
        ))))
    }
}

/// Result type for parsing.
pub type SyntaxResult<T> = Result<T, SyntaxError>;

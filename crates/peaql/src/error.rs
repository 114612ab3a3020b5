//! Error types for the engine.

use peaql_parser::{ParseError, Span};
use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more parse errors from a single statement text.
    #[error("parse error: {}", format_parse_errors(.0))]
    Parse(Vec<ParseError>),

    /// Semantic analysis failure: unknown names, type mismatches, bad
    /// indices, invalid window frames, structural misuse.
    #[error("compile error: {message}")]
    Compile {
        /// What went wrong.
        message: String,
        /// Where in the query text, when known.
        span: Option<Span>,
    },

    /// Invalid API usage, e.g. mixed placeholder styles or missing
    /// parameters.
    #[error("programming error: {0}")]
    Programming(String),

    /// No operator/function signature defined for the given types.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Constraint violation or failed coercion during INSERT/UPDATE.
    #[error("{0}")]
    Data(String),

    /// A compiler invariant was broken; never expected in tested scenarios.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a compile error without location information.
    #[must_use]
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
            span: None,
        }
    }

    /// Creates a compile error anchored at `span`.
    #[must_use]
    pub fn compile_at(message: impl Into<String>, span: Span) -> Self {
        Self::Compile {
            message: message.into(),
            span: Some(span),
        }
    }
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_errors_surface_together() {
        let errors = vec![
            ParseError::new("first", Span::new(0, 1)),
            ParseError::new("second", Span::new(4, 5)),
        ];
        let rendered = Error::Parse(errors).to_string();
        assert!(rendered.contains("first"));
        assert!(rendered.contains("second"));
    }

    #[test]
    fn test_data_error_is_bare() {
        let err = Error::Data("new row for relation \"t1\" violates check constraint \"t1_b_check\"".into());
        assert!(err.to_string().starts_with("new row"));
    }
}

//! # peaql-parser
//!
//! The textual surface of the PeaQL engine: a hand-written lexer and a
//! recursive-descent parser with Pratt expression parsing, producing the AST
//! the engine crate compiles into evaluation plans.
//!
//! The parser is catalog-agnostic: names, types and overloads resolve later,
//! when the engine compiles the AST against a table catalog.
//!
//! ```rust
//! use peaql_parser::{Parser, ast::Statement};
//!
//! let script = Parser::new("SELECT name, count(*) FROM t GROUP BY 1").parse_script();
//! assert!(script.errors.is_empty());
//! assert!(matches!(script.statements[0], Statement::Query(_)));
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;

pub use lexer::{Lexer, Span, Token, TokenKind};
pub use parser::{IdentifierQuoting, ParseError, Parser, ParserOptions, Script};

//! PeaQL parser.
//!
//! A hand-written recursive descent parser with Pratt expression parsing for
//! the PeaQL SQL dialect.
//!
//! # Parsing approach
//!
//! Statements are parsed by dedicated recursive-descent methods; expressions
//! use a Pratt (top-down operator precedence) parser handling prefix, infix
//! and postfix operators. A script parse collects every statement it can and
//! every error it hits, resynchronizing at `;` boundaries so all parse errors
//! of a text are surfaced together.
//!
//! # Surface
//!
//! `SELECT` (DISTINCT, joins incl. ANTI, GROUP BY/HAVING, named windows,
//! PIVOT BY, ORDER BY with NULLS FIRST/LAST, LIMIT/OFFSET), compound queries
//! (`UNION`/`INTERSECT`/`EXCEPT [ALL]`), `WITH` CTEs, `CREATE TABLE`
//! (constraints, `AS <query>`), `DROP TABLE`, `INSERT`/`UPDATE`/`DELETE`
//! with `RETURNING`, `SET`, window frames (`ROWS`/`GROUPS`/`RANGE` with
//! `EXCLUDE`), `FILTER (WHERE …)`, array/tuple literals, subscripts,
//! `expr::type` casts, dotted attribute and method syntax, and positional
//! (`?`) or named (`:name`) placeholders.

mod error;
mod parser;
mod pratt;

pub use error::ParseError;
pub use parser::{IdentifierQuoting, Parser, ParserOptions, Script};

//! # peaql
//!
//! An embeddable, in-process SQL query engine over in-memory tables.
//!
//! Query text parses to an AST (`peaql-parser`), compiles into a typed
//! evaluation plan against a catalog of registered tables, and resolves to
//! a column schema plus a row set. DDL and DML mutate the catalog.
//!
//! ```rust
//! use peaql::{Context, Output, Value};
//!
//! let mut ctx = Context::new();
//! ctx.query("CREATE TABLE t1(a STRING, b INTEGER)").unwrap();
//! ctx.query("INSERT INTO t1 VALUES('peter', 1), ('pan', 2)").unwrap();
//!
//! let Output::Rows(result) = ctx.query("SELECT a FROM t1 WHERE b = 2").unwrap() else {
//!     panic!("expected rows");
//! };
//! assert_eq!(result.rows, vec![vec![Value::String("pan".into())]]);
//! ```
//!
//! The engine is single-threaded and synchronous: a query compiles and
//! executes without yielding, and the application owns any locking around a
//! [`Context`].

pub mod catalog;
mod compile;
pub mod error;
mod functions;
pub mod plan;
pub mod registry;
pub mod row;
pub mod types;
pub mod value;

pub use catalog::{
    create_database, CompileOptions, Column, Constraint, Context, Parameters, PreparedStatement,
    Table,
};
pub use error::{Error, Result};
pub use plan::{ColumnSchema, Output, Plan, ResultSet};
pub use row::Record;
pub use types::DType;
pub use value::{Interval, Value};

//! DDL column and constraint AST types.
//!
//! Type names are kept as raw strings here; the engine resolves them through
//! its cast-name registry when the statement is compiled.

use super::expression::Expr;

/// A column definition in CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// The column name.
    pub name: String,
    /// The declared type name, e.g. `STRING`, `INTEGER`.
    pub type_name: String,
    /// Whether the type carried an array suffix (`INTEGER[]`).
    pub is_array: bool,
    /// NOT NULL constraint.
    pub not_null: bool,
    /// DEFAULT expression.
    pub default: Option<Expr>,
    /// Inline CHECK constraint.
    pub check: Option<Expr>,
    /// Inline PRIMARY KEY marker.
    pub primary_key: bool,
    /// Inline UNIQUE marker.
    pub unique: bool,
}

impl ColumnDef {
    /// Creates a plain column definition with no constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_array: false,
            not_null: false,
            default: None,
            check: None,
            primary_key: false,
            unique: false,
        }
    }
}

/// A table-level constraint in CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    /// `[CONSTRAINT name] CHECK (expr)`.
    Check {
        /// Declared constraint name.
        name: Option<String>,
        /// The boolean expression.
        expr: Expr,
    },
    /// `[CONSTRAINT name] UNIQUE (cols)`.
    Unique {
        /// Declared constraint name.
        name: Option<String>,
        /// The constrained columns.
        columns: Vec<String>,
    },
    /// `[CONSTRAINT name] PRIMARY KEY (cols)`.
    PrimaryKey {
        /// Declared constraint name.
        name: Option<String>,
        /// The key columns.
        columns: Vec<String>,
    },
    /// `[CONSTRAINT name] FOREIGN KEY (cols) REFERENCES t (cols)`.
    ForeignKey {
        /// Declared constraint name.
        name: Option<String>,
        /// The referencing columns.
        columns: Vec<String>,
        /// The referenced table.
        ref_table: String,
        /// The referenced columns.
        ref_columns: Vec<String>,
    },
}

impl TableConstraint {
    /// Returns the declared name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Check { name, .. }
            | Self::Unique { name, .. }
            | Self::PrimaryKey { name, .. }
            | Self::ForeignKey { name, .. } => name.as_deref(),
        }
    }
}

//! Statement AST types.

use core::fmt;

use crate::lexer::Span;

use super::expression::{Expr, WindowSpec};
use super::types::{ColumnDef, TableConstraint};

/// Order direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Ascending order (default).
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl OrderDirection {
    /// Returns the SQL spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Null placement for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    /// NULLs sort before all values.
    First,
    /// NULLs sort after all values.
    Last,
}

/// An ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// The key expression (or a 1-based target index literal).
    pub expr: Expr,
    /// ASC or DESC.
    pub direction: OrderDirection,
    /// Explicit NULLS FIRST/LAST, if given.
    pub nulls: Option<NullOrdering>,
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN (default).
    Inner,
    /// LEFT [OUTER] JOIN.
    Left,
    /// RIGHT [OUTER] JOIN.
    Right,
    /// FULL [OUTER] JOIN.
    Full,
    /// CROSS JOIN.
    Cross,
    /// ANTI JOIN: left rows with no right match.
    Anti,
}

impl JoinType {
    /// Returns the SQL spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
            Self::Cross => "CROSS JOIN",
            Self::Anti => "ANTI JOIN",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The condition attached to a join.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    /// `ON <expr>`.
    On(Expr),
    /// `USING (col, …)`, rewritten by the compiler to equalities.
    Using(Vec<String>),
    /// No condition (CROSS joins, comma-separated FROM relations).
    None,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// The kind of join.
    pub join_type: JoinType,
    /// The joined relation.
    pub table: TableRef,
    /// ON / USING / bare.
    pub constraint: JoinConstraint,
}

/// A relation in the FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// A named table, optionally aliased.
    Named {
        /// The table name.
        name: String,
        /// The alias, if any.
        alias: Option<String>,
        /// Source span of the name.
        span: Span,
    },
    /// A parenthesized subquery; requires an alias.
    Subquery {
        /// The inner query.
        query: Box<Query>,
        /// The alias, if any.
        alias: Option<String>,
    },
}

impl TableRef {
    /// Returns the name the relation is known by in the query.
    #[must_use]
    pub fn binding_name(&self) -> Option<&str> {
        match self {
            Self::Named { name, alias, .. } => Some(alias.as_deref().unwrap_or(name)),
            Self::Subquery { alias, .. } => alias.as_deref(),
        }
    }
}

/// A SELECT target.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    /// The target expression.
    pub expr: Expr,
    /// Explicit alias.
    pub alias: Option<String>,
}

/// A common table expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    /// The CTE name.
    pub name: String,
    /// The defining query.
    pub query: Box<Query>,
}

/// Compound query operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    /// UNION.
    Union,
    /// INTERSECT.
    Intersect,
    /// EXCEPT.
    Except,
}

/// One `UNION/INTERSECT/EXCEPT [ALL]` arm of a compound query.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundSelect {
    /// The set operator.
    pub op: SetOp,
    /// Whether ALL was given (bag semantics).
    pub all: bool,
    /// The right-hand select core.
    pub select: Select,
}

/// A single SELECT core (no set operators, no outer ORDER BY/LIMIT).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    /// Whether DISTINCT was specified.
    pub distinct: bool,
    /// The target list.
    pub targets: Vec<SelectItem>,
    /// The FROM relation, if any.
    pub from: Option<TableRef>,
    /// JOIN clauses, in textual order.
    pub joins: Vec<Join>,
    /// WHERE predicate.
    pub where_clause: Option<Expr>,
    /// GROUP BY keys (expressions or 1-based indices).
    pub group_by: Vec<Expr>,
    /// HAVING predicate.
    pub having: Option<Expr>,
    /// Named windows: `WINDOW w AS (…), v AS (…)`.
    pub windows: Vec<(String, WindowSpec)>,
    /// PIVOT BY axes.
    pub pivot_by: Vec<Expr>,
}

impl Default for TableRef {
    fn default() -> Self {
        Self::Named {
            name: String::new(),
            alias: None,
            span: Span::default(),
        }
    }
}

/// A full query: CTEs, a select core, compound arms, and final ordering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    /// WITH entries, compiled before the body.
    pub with: Vec<Cte>,
    /// The first (or only) select core.
    pub select: Select,
    /// Subsequent compound arms.
    pub compounds: Vec<CompoundSelect>,
    /// ORDER BY over the whole result.
    pub order_by: Vec<OrderBy>,
    /// LIMIT row count.
    pub limit: Option<Expr>,
    /// OFFSET row count.
    pub offset: Option<Expr>,
}

/// The source of an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// `VALUES (…), (…)`.
    Values(Vec<Vec<Expr>>),
    /// `INSERT INTO t SELECT …`.
    Query(Box<Query>),
}

/// An INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// The target table.
    pub table: String,
    /// Explicit column list; empty means all columns in declared order.
    pub columns: Vec<String>,
    /// The row source.
    pub source: InsertSource,
    /// RETURNING target list.
    pub returning: Vec<SelectItem>,
    /// Source span of the table name.
    pub span: Span,
}

/// An UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// The target table.
    pub table: String,
    /// `col = expr` assignments.
    pub assignments: Vec<(String, Expr)>,
    /// WHERE predicate.
    pub where_clause: Option<Expr>,
    /// RETURNING target list.
    pub returning: Vec<SelectItem>,
    /// Source span of the table name.
    pub span: Span,
}

/// A DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// The target table.
    pub table: String,
    /// WHERE predicate.
    pub where_clause: Option<Expr>,
    /// RETURNING target list.
    pub returning: Vec<SelectItem>,
    /// Source span of the table name.
    pub span: Span,
}

/// A CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    /// The new table name.
    pub name: String,
    /// Whether IF NOT EXISTS was given.
    pub if_not_exists: bool,
    /// Column definitions.
    pub columns: Vec<ColumnDef>,
    /// Table-level constraints.
    pub constraints: Vec<TableConstraint>,
    /// `AS <query>` seed data.
    pub as_query: Option<Box<Query>>,
    /// Source span of the table name.
    pub span: Span,
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// A query.
    Query(Box<Query>),
    /// CREATE TABLE.
    CreateTable(CreateTable),
    /// DROP TABLE.
    DropTable {
        /// The table name.
        name: String,
        /// Whether IF EXISTS was given.
        if_exists: bool,
        /// Source span of the table name.
        span: Span,
    },
    /// INSERT.
    Insert(Insert),
    /// UPDATE.
    Update(Update),
    /// DELETE.
    Delete(Delete),
    /// `SET name = value`, harvested into statement settings.
    Set {
        /// The setting name.
        name: String,
        /// The setting value.
        value: Expr,
    },
}

//! Expression AST types.

use crate::lexer::Span;

use super::statement::{OrderBy, Query};

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Boolean literal.
    Boolean(bool),
    /// NULL literal.
    Null,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Logical
    And,
    Or,

    // String
    Concat,
    Like,

    // POSIX-style regex matching
    Match,
    MatchCi,
    NotMatch,
    NotMatchCi,
    /// `?~`: pattern on the left, accepts an embedded `(?flags)` prefix.
    MatchPrefixed,
    /// `?~*`: case-insensitive form of `?~`.
    MatchPrefixedCi,
}

impl BinaryOp {
    /// Returns the SQL spelling of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Concat => "||",
            Self::Like => "LIKE",
            Self::Match => "~",
            Self::MatchCi => "~*",
            Self::NotMatch => "!~",
            Self::NotMatchCi => "!~*",
            Self::MatchPrefixed => "?~",
            Self::MatchPrefixedCi => "?~*",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Negation (`-`).
    Neg,
    /// Logical NOT.
    Not,
}

impl UnaryOp {
    /// Returns the SQL spelling of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "NOT",
        }
    }
}

/// A window frame unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameUnits {
    /// Physical row offsets.
    #[default]
    Rows,
    /// Peer-group offsets.
    Groups,
    /// Value-range offsets on the single ORDER BY key.
    Range,
}

/// One bound of a window frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBound {
    /// `UNBOUNDED PRECEDING`.
    UnboundedPreceding,
    /// `<expr> PRECEDING`.
    Preceding(Expr),
    /// `CURRENT ROW`.
    CurrentRow,
    /// `<expr> FOLLOWING`.
    Following(Expr),
    /// `UNBOUNDED FOLLOWING`.
    UnboundedFollowing,
}

/// Window frame EXCLUDE modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameExclusion {
    /// `EXCLUDE NO OTHERS` (default).
    #[default]
    NoOthers,
    /// `EXCLUDE CURRENT ROW`.
    CurrentRow,
    /// `EXCLUDE GROUP`: the current row's whole peer group.
    Group,
    /// `EXCLUDE TIES`: the peer group minus the current row.
    Ties,
}

/// A window frame clause.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowFrame {
    /// ROWS, GROUPS or RANGE.
    pub units: FrameUnits,
    /// The frame start bound.
    pub start: FrameBound,
    /// The frame end bound.
    pub end: FrameBound,
    /// Rows excluded after frame computation.
    pub exclude: FrameExclusion,
}

/// A window specification, inline or referencing a named window.
///
/// `OVER w` parses as a spec whose `base` is `w` with every other field
/// empty; `OVER (w ORDER BY x)` carries `base` plus the overridden fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    /// Named window this spec refines.
    pub base: Option<String>,
    /// PARTITION BY expressions.
    pub partition_by: Vec<Expr>,
    /// ORDER BY entries.
    pub order_by: Vec<OrderBy>,
    /// Optional frame clause.
    pub frame: Option<WindowFrame>,
}

/// A function or aggregate call.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// The function name.
    pub name: String,
    /// The arguments.
    pub args: Vec<Expr>,
    /// Whether DISTINCT was specified.
    pub distinct: bool,
    /// `FILTER (WHERE …)` predicate.
    pub filter: Option<Box<Expr>>,
    /// `OVER (…)` window attachment.
    pub over: Option<WindowSpec>,
    /// Source location of the call.
    pub span: Span,
}

/// The right-hand side of an IN expression.
#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    /// An explicit expression list.
    Exprs(Vec<Expr>),
    /// A single-column subquery.
    Subquery(Box<Query>),
    /// A general list-valued expression, e.g. a List column.
    Expr(Box<Expr>),
}

/// A PeaQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Literal),

    /// A column reference, optionally qualified.
    ///
    /// The qualifier is resolved by the compiler: it names a table or join
    /// alias, or a structured column whose attribute is being read.
    Column {
        /// Table/alias qualifier.
        table: Option<String>,
        /// Column name.
        name: String,
        /// Whether the name was written as a delimited identifier. Under
        /// `identifier_quoting = auto` an unresolvable quoted name falls
        /// back to a string literal instead of erroring.
        quoted: bool,
        /// Source span.
        span: Span,
    },

    /// A binary expression.
    Binary {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expr>,
    },

    /// A unary expression.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },

    /// A function call.
    Function(Box<FunctionCall>),

    /// Attribute access on a computed expression, e.g. `(d + 1).year`.
    Attribute {
        /// The receiver expression.
        expr: Box<Expr>,
        /// The attribute name.
        name: String,
        /// Source span of the attribute name.
        span: Span,
    },

    /// Dotted method call, e.g. `x.toFixed(3)`.
    ///
    /// The compiler rewrites this to `toFixed(x, 3)`.
    Method {
        /// The receiver expression.
        expr: Box<Expr>,
        /// The call with the remaining arguments.
        call: Box<FunctionCall>,
    },

    /// Subscript access, e.g. `xs[1]` or `row["key"]`.
    Subscript {
        /// The indexed expression.
        expr: Box<Expr>,
        /// The index expression.
        index: Box<Expr>,
    },

    /// Cast suffix `expr::type`, compiled as `type(expr)`.
    Cast {
        /// The operand.
        expr: Box<Expr>,
        /// The target type name.
        type_name: String,
        /// Source span of the type name.
        span: Span,
    },

    /// A scalar (1×1) or list (1×N) subquery; context decides.
    Subquery(Box<Query>),

    /// `EXISTS (…)`.
    Exists(Box<Query>),

    /// IS NULL / IS NOT NULL.
    IsNull {
        /// The expression to test.
        expr: Box<Expr>,
        /// Whether this is IS NOT NULL.
        negated: bool,
    },

    /// IN / NOT IN.
    In {
        /// The needle expression.
        expr: Box<Expr>,
        /// The haystack.
        list: InList,
        /// Whether this is NOT IN.
        negated: bool,
    },

    /// BETWEEN / NOT BETWEEN.
    Between {
        /// The tested expression.
        expr: Box<Expr>,
        /// Lower bound.
        low: Box<Expr>,
        /// Upper bound.
        high: Box<Expr>,
        /// Whether this is NOT BETWEEN.
        negated: bool,
    },

    /// CASE expression, with or without an operand.
    Case {
        /// The operand (simple CASE).
        operand: Option<Box<Expr>>,
        /// WHEN/THEN arms.
        when_clauses: Vec<(Expr, Expr)>,
        /// ELSE arm.
        else_clause: Option<Box<Expr>>,
    },

    /// Array literal `[a, b, c]`.
    Array(Vec<Expr>),

    /// Tuple literal `(a, b, c)`.
    Tuple(Vec<Expr>),

    /// A parameter placeholder (`?` or `:name`).
    Parameter {
        /// The parameter name, if named.
        name: Option<String>,
        /// 1-based position for positional placeholders.
        position: usize,
        /// Source span.
        span: Span,
    },

    /// Wildcard `*` or `t.*` in a target list or `count(*)`.
    Wildcard {
        /// Table qualifier.
        table: Option<String>,
    },
}

impl Expr {
    /// Creates an unqualified column reference.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column {
            table: None,
            name: name.into(),
            quoted: false,
            span: Span::default(),
        }
    }

    /// Creates a qualified column reference.
    #[must_use]
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Column {
            table: Some(table.into()),
            name: name.into(),
            quoted: false,
            span: Span::default(),
        }
    }

    /// Creates an integer literal.
    #[must_use]
    pub const fn integer(value: i64) -> Self {
        Self::Literal(Literal::Integer(value))
    }

    /// Creates a string literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    /// Creates a boolean literal.
    #[must_use]
    pub const fn boolean(value: bool) -> Self {
        Self::Literal(Literal::Boolean(value))
    }

    /// Creates a NULL literal.
    #[must_use]
    pub const fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    /// Creates a binary expression.
    #[must_use]
    pub fn binary(self, op: BinaryOp, right: Self) -> Self {
        Self::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an equality comparison.
    #[must_use]
    pub fn eq(self, right: Self) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    /// Creates a conjunction.
    #[must_use]
    pub fn and(self, right: Self) -> Self {
        self.binary(BinaryOp::And, right)
    }

    /// Returns the span of this expression where one is tracked.
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Column { span, .. }
            | Self::Attribute { span, .. }
            | Self::Cast { span, .. }
            | Self::Parameter { span, .. } => *span,
            Self::Function(call) | Self::Method { call, .. } => call.span,
            Self::Binary { left, .. } => left.span(),
            Self::Unary { operand, .. } => operand.span(),
            _ => Span::default(),
        }
    }
}

impl FunctionCall {
    /// Structural equality ignoring source spans.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.distinct == other.distinct
            && self.args.len() == other.args.len()
            && self.args.iter().zip(&other.args).all(|(a, b)| a.same_shape(b))
            && match (&self.filter, &other.filter) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same_shape(b),
                _ => false,
            }
            && self.over == other.over
    }
}

impl Expr {
    /// Structural equality ignoring source spans, used by the compiler to
    /// match GROUP/ORDER/PARTITION/PIVOT entries against existing targets.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (
                Self::Column {
                    table: t1,
                    name: n1,
                    quoted: q1,
                    ..
                },
                Self::Column {
                    table: t2,
                    name: n2,
                    quoted: q2,
                    ..
                },
            ) => t1 == t2 && n1 == n2 && q1 == q2,
            (
                Self::Binary {
                    left: l1,
                    op: o1,
                    right: r1,
                },
                Self::Binary {
                    left: l2,
                    op: o2,
                    right: r2,
                },
            ) => o1 == o2 && l1.same_shape(l2) && r1.same_shape(r2),
            (
                Self::Unary { op: o1, operand: e1 },
                Self::Unary { op: o2, operand: e2 },
            ) => o1 == o2 && e1.same_shape(e2),
            (Self::Function(a), Self::Function(b)) => a.same_shape(b),
            (
                Self::Method { expr: e1, call: c1 },
                Self::Method { expr: e2, call: c2 },
            ) => e1.same_shape(e2) && c1.same_shape(c2),
            (
                Self::Attribute { expr: e1, name: n1, .. },
                Self::Attribute { expr: e2, name: n2, .. },
            ) => n1 == n2 && e1.same_shape(e2),
            (
                Self::Subscript { expr: e1, index: i1 },
                Self::Subscript { expr: e2, index: i2 },
            ) => e1.same_shape(e2) && i1.same_shape(i2),
            (
                Self::Cast {
                    expr: e1,
                    type_name: t1,
                    ..
                },
                Self::Cast {
                    expr: e2,
                    type_name: t2,
                    ..
                },
            ) => t1.eq_ignore_ascii_case(t2) && e1.same_shape(e2),
            // Subqueries compare strictly; a false negative only costs a
            // duplicate hidden target.
            (Self::Subquery(a), Self::Subquery(b)) => a == b,
            (Self::Exists(a), Self::Exists(b)) => a == b,
            (
                Self::IsNull { expr: e1, negated: n1 },
                Self::IsNull { expr: e2, negated: n2 },
            ) => n1 == n2 && e1.same_shape(e2),
            (
                Self::In {
                    expr: e1,
                    list: l1,
                    negated: n1,
                },
                Self::In {
                    expr: e2,
                    list: l2,
                    negated: n2,
                },
            ) => {
                n1 == n2
                    && e1.same_shape(e2)
                    && match (l1, l2) {
                        (InList::Exprs(a), InList::Exprs(b)) => {
                            a.len() == b.len()
                                && a.iter().zip(b).all(|(x, y)| x.same_shape(y))
                        }
                        (InList::Expr(a), InList::Expr(b)) => a.same_shape(b),
                        (InList::Subquery(a), InList::Subquery(b)) => a == b,
                        _ => false,
                    }
            }
            (
                Self::Between {
                    expr: e1,
                    low: lo1,
                    high: hi1,
                    negated: n1,
                },
                Self::Between {
                    expr: e2,
                    low: lo2,
                    high: hi2,
                    negated: n2,
                },
            ) => {
                n1 == n2 && e1.same_shape(e2) && lo1.same_shape(lo2) && hi1.same_shape(hi2)
            }
            (
                Self::Case {
                    operand: o1,
                    when_clauses: w1,
                    else_clause: el1,
                },
                Self::Case {
                    operand: o2,
                    when_clauses: w2,
                    else_clause: el2,
                },
            ) => {
                let operands = match (o1, o2) {
                    (None, None) => true,
                    (Some(a), Some(b)) => a.same_shape(b),
                    _ => false,
                };
                let elses = match (el1, el2) {
                    (None, None) => true,
                    (Some(a), Some(b)) => a.same_shape(b),
                    _ => false,
                };
                operands
                    && elses
                    && w1.len() == w2.len()
                    && w1.iter().zip(w2).all(|((wa, ta), (wb, tb))| {
                        wa.same_shape(wb) && ta.same_shape(tb)
                    })
            }
            (Self::Array(a), Self::Array(b)) | (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_shape(y))
            }
            (
                Self::Parameter {
                    name: n1,
                    position: p1,
                    ..
                },
                Self::Parameter {
                    name: n2,
                    position: p2,
                    ..
                },
            ) => n1 == n2 && p1 == p2,
            (Self::Wildcard { table: t1 }, Self::Wildcard { table: t2 }) => t1 == t2,
            _ => false,
        }
    }
}

impl core::fmt::Display for Literal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::Null => f.write_str("NULL"),
        }
    }
}

/// Renders the expression back to query text. Used to persist compiled
/// constraint expressions, which re-parse on load.
impl core::fmt::Display for Expr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Literal(literal) => write!(f, "{literal}"),
            Self::Column { table, name, .. } => match table {
                Some(table) => write!(f, "{table}.{name}"),
                None => f.write_str(name),
            },
            Self::Binary { left, op, right } => {
                write!(f, "({left} {} {right})", op.as_str())
            }
            Self::Unary { op, operand } => match op {
                UnaryOp::Neg => write!(f, "-{operand}"),
                UnaryOp::Not => write!(f, "NOT {operand}"),
            },
            Self::Function(call) | Self::Method { call, .. } => {
                if let Self::Method { expr, .. } = self {
                    write!(f, "{expr}.")?;
                }
                write!(f, "{}(", call.name)?;
                if call.distinct {
                    f.write_str("DISTINCT ")?;
                }
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Attribute { expr, name, .. } => write!(f, "{expr}.{name}"),
            Self::Subscript { expr, index } => write!(f, "{expr}[{index}]"),
            Self::Cast { expr, type_name, .. } => write!(f, "{expr}::{type_name}"),
            Self::Subquery(_) | Self::Exists(_) => f.write_str("(subquery)"),
            Self::IsNull { expr, negated } => {
                write!(f, "{expr} IS {}NULL", if *negated { "NOT " } else { "" })
            }
            Self::In {
                expr,
                list,
                negated,
            } => {
                write!(f, "{expr} {}IN ", if *negated { "NOT " } else { "" })?;
                match list {
                    InList::Exprs(items) => {
                        f.write_str("(")?;
                        for (i, item) in items.iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{item}")?;
                        }
                        f.write_str(")")
                    }
                    InList::Expr(item) => write!(f, "{item}"),
                    InList::Subquery(_) => f.write_str("(subquery)"),
                }
            }
            Self::Between {
                expr,
                low,
                high,
                negated,
            } => write!(
                f,
                "{expr} {}BETWEEN {low} AND {high}",
                if *negated { "NOT " } else { "" }
            ),
            Self::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                f.write_str("CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {operand}")?;
                }
                for (when, then) in when_clauses {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(else_clause) = else_clause {
                    write!(f, " ELSE {else_clause}")?;
                }
                f.write_str(" END")
            }
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Parameter { name, position, .. } => match name {
                Some(name) => write!(f, ":{name}"),
                None => write!(f, "?{position}"),
            },
            Self::Wildcard { table } => match table {
                Some(table) => write!(f, "{table}.*"),
                None => f.write_str("*"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip_shapes() {
        let expr = Expr::column("b").binary(BinaryOp::Gt, Expr::integer(100));
        assert_eq!(expr.to_string(), "(b > 100)");
        let expr = Expr::column("a").eq(Expr::string("it's"));
        assert_eq!(expr.to_string(), "(a = 'it''s')");
    }

    #[test]
    fn test_expr_builders() {
        let expr = Expr::column("age").binary(BinaryOp::Gt, Expr::integer(18));
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Gt, .. }));
    }

    #[test]
    fn test_operator_spelling() {
        assert_eq!(BinaryOp::MatchCi.as_str(), "~*");
        assert_eq!(BinaryOp::MatchPrefixed.as_str(), "?~");
        assert_eq!(BinaryOp::NotEq.as_str(), "!=");
    }
}

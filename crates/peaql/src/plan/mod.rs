//! Compiled evaluation plans.
//!
//! Expression nodes are immutable after compile except for the sanctioned
//! interior state: aggregator result cells written at group finalize and
//! window result cells written by the window driver. Both are re-set on each
//! `resolve()` of the owning plan.

mod eval;
mod stmt;
mod window;

pub(crate) use window::run_windows;

use std::cell::RefCell;
use std::rc::Rc;

use crate::catalog::Table;
use crate::error::{Error, Result};
use crate::registry::{Accumulator, AggregateDef, Signature};
use crate::row::Record;
use crate::types::DType;
use crate::value::Value;

pub use stmt::{CreateTablePlan, DeletePlan, DropTablePlan, InsertPlan, UpdatePlan};
pub(crate) use stmt::InsertSourcePlan;

/// One column of an output schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    /// The column name.
    pub name: String,
    /// The column type.
    pub dtype: DType,
}

/// A query result: schema plus row set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    /// Output columns, in declared order.
    pub columns: Vec<ColumnSchema>,
    /// Output rows.
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// The column names, in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// The result of resolving a statement plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// A result set: queries, RETURNING-bearing DML, seeded DDL.
    Rows(ResultSet),
    /// An affected-row count: plain DML and DDL.
    Count(usize),
}

impl Output {
    /// The result set, if this output carries one.
    #[must_use]
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            Self::Rows(rs) => Some(rs),
            Self::Count(_) => None,
        }
    }

    /// The affected-row count, if this output carries one.
    #[must_use]
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::Rows(_) => None,
            Self::Count(n) => Some(*n),
        }
    }
}

/// A compiled statement.
pub enum Plan {
    /// A query.
    Query(Rc<QueryPlan>),
    /// CREATE TABLE.
    CreateTable(CreateTablePlan),
    /// DROP TABLE.
    DropTable(DropTablePlan),
    /// INSERT.
    Insert(InsertPlan),
    /// UPDATE.
    Update(UpdatePlan),
    /// DELETE.
    Delete(DeletePlan),
    /// A statement block; resolves children in order, returns the last
    /// result.
    Statements(Vec<Plan>),
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Self::Query(_) => "Query",
            Self::CreateTable(_) => "CreateTable",
            Self::DropTable(_) => "DropTable",
            Self::Insert(_) => "Insert",
            Self::Update(_) => "Update",
            Self::Delete(_) => "Delete",
            Self::Statements(_) => "Statements",
        };
        f.write_str(variant)
    }
}

impl Plan {
    /// Executes the plan.
    ///
    /// # Errors
    ///
    /// Data errors (constraint violations, failed coercions) and the scalar
    /// subquery cardinality error surface here; everything else was caught
    /// at compile time.
    pub fn resolve(&self) -> Result<Output> {
        match self {
            Self::Query(query) => Ok(Output::Rows(query.resolve(None)?)),
            Self::CreateTable(plan) => plan.resolve(),
            Self::DropTable(plan) => plan.resolve(),
            Self::Insert(plan) => plan.resolve(),
            Self::Update(plan) => plan.resolve(),
            Self::Delete(plan) => plan.resolve(),
            Self::Statements(plans) => {
                let mut last = Output::Count(0);
                for plan in plans {
                    last = plan.resolve()?;
                }
                Ok(last)
            }
        }
    }
}

// ---------------------------------------------------------------------
// Expression nodes
// ---------------------------------------------------------------------

/// A compiled column reference.
#[derive(Debug, Clone)]
pub(crate) struct ColumnRef {
    /// The scope to read through; `None` reads the current row's fields.
    pub scope: Option<String>,
    /// The field name.
    pub field: String,
    /// The declared type.
    pub dtype: DType,
}

impl ColumnRef {
    fn resolve(&self, row: &Record) -> Value {
        let found = match &self.scope {
            None => row.get(&self.field),
            Some(scope) => row.get_scoped(scope, &self.field),
        };
        found.cloned().unwrap_or(Value::Null)
    }
}

/// A dispatched function call.
#[derive(Clone)]
pub(crate) struct CallNode {
    pub name: String,
    pub sig: &'static Signature,
    pub args: Vec<Node>,
}

/// A compiled aggregate call. The result cell is written at group finalize
/// so mixed targets can re-resolve through it.
pub(crate) struct AggregateExpr {
    pub name: String,
    pub def: &'static AggregateDef,
    pub args: Vec<Node>,
    /// `count(*)`: update on every row, no argument evaluation.
    pub star: bool,
    pub distinct: bool,
    pub filter: Option<Node>,
    pub dtype: DType,
    pub value: RefCell<Value>,
}

impl AggregateExpr {
    /// Allocates fresh accumulator state, wrapping DISTINCT when requested.
    pub(crate) fn make_accumulator(&self) -> Box<dyn Accumulator> {
        let inner = (self.def.factory)();
        if self.distinct {
            Box::new(crate::functions::aggregate::Distinct::new(inner))
        } else {
            inner
        }
    }

    /// Evaluates the argument vector for one row.
    pub(crate) fn eval_args(&self, row: &Record) -> Result<Vec<Value>> {
        self.args.iter().map(|arg| arg.resolve(row)).collect()
    }
}

/// Frame units of a compiled window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameMode {
    Rows,
    Groups,
    Range,
}

/// EXCLUDE modes of a compiled window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExcludeMode {
    None,
    Current,
    Group,
    Ties,
}

/// A compiled frame clause; `f64::INFINITY` encodes UNBOUNDED.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FramePlan {
    pub mode: FrameMode,
    pub preceding: f64,
    pub following: f64,
    pub exclude: ExcludeMode,
}

/// An ordering key of a window, referencing a (possibly hidden) target.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WindowOrderKey {
    pub target: usize,
    pub desc: bool,
}

/// A compiled window attachment around an aggregate.
///
/// Partition/order/frame are filled in by the compiler's window-lowering
/// pass, which runs after the target list exists (key lowering appends
/// hidden targets).
pub(crate) struct WindowExpr {
    pub agg: Rc<AggregateExpr>,
    /// Partition key target indices.
    pub partition: RefCell<Vec<usize>>,
    /// Ordering keys.
    pub order: RefCell<Vec<WindowOrderKey>>,
    pub frame: std::cell::Cell<FramePlan>,
    /// Written back per row by the window driver.
    pub value: RefCell<Value>,
}

/// A compiled scalar/list/EXISTS subquery with materialize-once caching for
/// uncorrelated bodies.
pub(crate) struct SubqueryExpr {
    pub plan: Rc<QueryPlan>,
    pub correlated: bool,
    pub dtype: DType,
    cache: RefCell<Option<Rc<ResultSet>>>,
}

impl SubqueryExpr {
    pub(crate) fn new(plan: Rc<QueryPlan>, correlated: bool, dtype: DType) -> Self {
        Self {
            plan,
            correlated,
            dtype,
            cache: RefCell::new(None),
        }
    }

    /// Runs the subquery, caching uncorrelated results for the duration of
    /// the enclosing execution.
    fn result(&self, row: &Record) -> Result<Rc<ResultSet>> {
        if !self.correlated {
            if let Some(cached) = self.cache.borrow().as_ref() {
                return Ok(Rc::clone(cached));
            }
        }
        let result = Rc::new(self.plan.resolve(Some(row))?);
        if !self.correlated {
            *self.cache.borrow_mut() = Some(Rc::clone(&result));
        }
        Ok(result)
    }

    /// Drops any cached result so a fresh `resolve()` of the enclosing plan
    /// sees current data.
    pub(crate) fn invalidate(&self) {
        *self.cache.borrow_mut() = None;
    }
}

/// The haystack of an IN expression.
#[derive(Clone)]
pub(crate) enum InItems {
    List(Vec<Node>),
    Expr(Box<Node>),
    Subquery(Rc<SubqueryExpr>),
}

/// A compiled expression.
///
/// Cloning is shallow where it matters: aggregate, window and subquery
/// subtrees sit behind `Rc`, so a cloned node shares their state cells and
/// caches (a rewrite that mentions an operand twice still materializes its
/// subquery once).
#[derive(Clone)]
pub(crate) enum Node {
    Constant(Value),
    Column(ColumnRef),
    Call(CallNode),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    IsNull {
        expr: Box<Node>,
        negated: bool,
    },
    In {
        expr: Box<Node>,
        items: InItems,
        negated: bool,
    },
    Case {
        operand: Option<Box<Node>>,
        arms: Vec<(Node, Node)>,
        otherwise: Option<Box<Node>>,
    },
    Coalesce(Vec<Node>),
    ListLit(Vec<Node>),
    Attribute {
        expr: Box<Node>,
        name: String,
        dtype: DType,
    },
    Subscript {
        expr: Box<Node>,
        index: Box<Node>,
    },
    Aggregate(Rc<AggregateExpr>),
    Window(Rc<WindowExpr>),
    ScalarSubquery(Rc<SubqueryExpr>),
    ListSubquery(Rc<SubqueryExpr>),
    Exists(Rc<SubqueryExpr>),
}

impl Node {
    /// Evaluates the node against a row.
    pub(crate) fn resolve(&self, row: &Record) -> Result<Value> {
        match self {
            Self::Constant(value) => Ok(value.clone()),
            Self::Column(col) => Ok(col.resolve(row)),
            Self::Call(call) => {
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(arg.resolve(row)?);
                }
                if !call.sig.null_safe && args.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                Ok((call.sig.eval)(&args))
            }
            Self::And(operands) => {
                let mut unknown = false;
                for operand in operands {
                    match operand.resolve(row)?.truthy() {
                        Some(false) => return Ok(Value::Boolean(false)),
                        Some(true) => {}
                        None => unknown = true,
                    }
                }
                Ok(if unknown {
                    Value::Null
                } else {
                    Value::Boolean(true)
                })
            }
            Self::Or(operands) => {
                let mut unknown = false;
                for operand in operands {
                    match operand.resolve(row)?.truthy() {
                        Some(true) => return Ok(Value::Boolean(true)),
                        Some(false) => {}
                        None => unknown = true,
                    }
                }
                Ok(if unknown {
                    Value::Null
                } else {
                    Value::Boolean(false)
                })
            }
            Self::Not(operand) => Ok(match operand.resolve(row)?.truthy() {
                Some(b) => Value::Boolean(!b),
                None => Value::Null,
            }),
            Self::IsNull { expr, negated } => {
                let value = expr.resolve(row)?;
                Ok(Value::Boolean(value.is_null() != *negated))
            }
            Self::In {
                expr,
                items,
                negated,
            } => {
                let needle = expr.resolve(row)?;
                if needle.is_null() {
                    return Ok(Value::Null);
                }
                let haystack: Vec<Value> = match items {
                    InItems::List(nodes) => {
                        let mut values = Vec::with_capacity(nodes.len());
                        for node in nodes {
                            values.push(node.resolve(row)?);
                        }
                        values
                    }
                    InItems::Expr(node) => match node.resolve(row)? {
                        Value::List(items) | Value::Set(items) => items,
                        Value::Null => return Ok(Value::Null),
                        other => vec![other],
                    },
                    InItems::Subquery(subquery) => {
                        let result = subquery.result(row)?;
                        result.rows.iter().map(|r| r[0].clone()).collect()
                    }
                };
                let mut saw_null = false;
                for candidate in &haystack {
                    if candidate.is_null() {
                        saw_null = true;
                    } else if needle == *candidate {
                        return Ok(Value::Boolean(!negated));
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Boolean(*negated)
                })
            }
            Self::Case {
                operand,
                arms,
                otherwise,
            } => {
                match operand {
                    Some(operand) => {
                        let probe = operand.resolve(row)?;
                        for (when, then) in arms {
                            if !probe.is_null() && probe == when.resolve(row)? {
                                return then.resolve(row);
                            }
                        }
                    }
                    None => {
                        for (when, then) in arms {
                            if when.resolve(row)?.truthy() == Some(true) {
                                return then.resolve(row);
                            }
                        }
                    }
                }
                match otherwise {
                    Some(node) => node.resolve(row),
                    None => Ok(Value::Null),
                }
            }
            Self::Coalesce(operands) => {
                for operand in operands {
                    let value = operand.resolve(row)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
            Self::ListLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.resolve(row)?);
                }
                Ok(Value::List(values))
            }
            Self::Attribute { expr, name, .. } => {
                let value = expr.resolve(row)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                Ok(crate::types::attribute(&value.dtype(), name)
                    .map_or(Value::Null, |attr| (attr.get)(&value)))
            }
            Self::Subscript { expr, index } => {
                let value = expr.resolve(row)?;
                let index = index.resolve(row)?;
                Ok(subscript(&value, &index))
            }
            Self::Aggregate(agg) => Ok(agg.value.borrow().clone()),
            Self::Window(window) => Ok(window.value.borrow().clone()),
            Self::ScalarSubquery(subquery) => {
                let result = subquery.result(row)?;
                match result.rows.len() {
                    0 => Ok(Value::Null),
                    1 => Ok(result.rows[0][0].clone()),
                    _ => Err(Error::Data(
                        "more than one row returned by a subquery used as an expression".into(),
                    )),
                }
            }
            Self::ListSubquery(subquery) => {
                let result = subquery.result(row)?;
                Ok(Value::List(
                    result.rows.iter().map(|r| r[0].clone()).collect(),
                ))
            }
            Self::Exists(subquery) => {
                let result = subquery.result(row)?;
                Ok(Value::Boolean(!result.rows.is_empty()))
            }
        }
    }

    /// The node's static result type.
    pub(crate) fn dtype(&self) -> DType {
        match self {
            Self::Constant(value) => value.dtype(),
            Self::Column(col) => col.dtype.clone(),
            Self::Call(call) => call.sig.ret.clone(),
            Self::And(_) | Self::Or(_) | Self::Not(_) | Self::IsNull { .. } | Self::In { .. } => {
                DType::Boolean
            }
            Self::Exists(_) => DType::Boolean,
            Self::Case { arms, otherwise, .. } => {
                for (_, then) in arms {
                    let dtype = then.dtype();
                    if dtype != DType::Null {
                        return dtype;
                    }
                }
                otherwise.as_ref().map_or(DType::Null, |node| node.dtype())
            }
            Self::Coalesce(operands) => {
                for operand in operands {
                    let dtype = operand.dtype();
                    if dtype != DType::Null {
                        return dtype;
                    }
                }
                DType::Null
            }
            Self::ListLit(items) => {
                let elem = items.first().map_or(DType::Object, Node::dtype);
                DType::List(Box::new(elem))
            }
            Self::Attribute { dtype, .. } => dtype.clone(),
            Self::Subscript { expr, .. } => match expr.dtype() {
                DType::List(elem) => *elem,
                _ => DType::Object,
            },
            Self::Aggregate(agg) => agg.dtype.clone(),
            Self::Window(window) => window.agg.dtype.clone(),
            Self::ScalarSubquery(subquery) => subquery.dtype.clone(),
            Self::ListSubquery(subquery) => DType::List(Box::new(subquery.dtype.clone())),
        }
    }

    /// Whether the node is a compile-time constant.
    pub(crate) fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }

    /// Visits this node and, where `descend` returns true, its children.
    pub(crate) fn visit(&self, visitor: &mut impl FnMut(&Node) -> bool) {
        if !visitor(self) {
            return;
        }
        match self {
            Self::Constant(_) | Self::Column(_) => {}
            Self::Call(call) => {
                for arg in &call.args {
                    arg.visit(visitor);
                }
            }
            Self::And(nodes) | Self::Or(nodes) | Self::Coalesce(nodes) | Self::ListLit(nodes) => {
                for node in nodes {
                    node.visit(visitor);
                }
            }
            Self::Not(node) => node.visit(visitor),
            Self::IsNull { expr, .. } | Self::Attribute { expr, .. } => expr.visit(visitor),
            Self::In { expr, items, .. } => {
                expr.visit(visitor);
                match items {
                    InItems::List(nodes) => {
                        for node in nodes {
                            node.visit(visitor);
                        }
                    }
                    InItems::Expr(node) => node.visit(visitor),
                    InItems::Subquery(_) => {}
                }
            }
            Self::Case {
                operand,
                arms,
                otherwise,
            } => {
                if let Some(operand) = operand {
                    operand.visit(visitor);
                }
                for (when, then) in arms {
                    when.visit(visitor);
                    then.visit(visitor);
                }
                if let Some(otherwise) = otherwise {
                    otherwise.visit(visitor);
                }
            }
            Self::Subscript { expr, index } => {
                expr.visit(visitor);
                index.visit(visitor);
            }
            Self::Aggregate(agg) => {
                for arg in &agg.args {
                    arg.visit(visitor);
                }
                if let Some(filter) = &agg.filter {
                    filter.visit(visitor);
                }
            }
            Self::Window(window) => {
                for arg in &window.agg.args {
                    arg.visit(visitor);
                }
            }
            Self::ScalarSubquery(_) | Self::ListSubquery(_) | Self::Exists(_) => {}
        }
    }

    /// Drops cached subquery results everywhere beneath this node.
    pub(crate) fn invalidate_subqueries(&self) {
        self.visit(&mut |node| {
            match node {
                Self::ScalarSubquery(sq) | Self::ListSubquery(sq) | Self::Exists(sq) => {
                    sq.invalidate();
                }
                Self::In {
                    items: InItems::Subquery(sq),
                    ..
                } => sq.invalidate(),
                _ => {}
            }
            true
        });
    }
}

/// Subscript semantics: 1-based list indexing; string keys read structure
/// attributes; anything else is Null.
fn subscript(value: &Value, index: &Value) -> Value {
    match (value, index) {
        (Value::List(items) | Value::Set(items), _) => {
            let Some(i) = index.as_i64() else {
                return Value::Null;
            };
            if i < 1 {
                return Value::Null;
            }
            items.get((i - 1) as usize).cloned().unwrap_or(Value::Null)
        }
        (_, Value::String(key)) => crate::types::attribute(&value.dtype(), key)
            .map_or(Value::Null, |attr| (attr.get)(value)),
        _ => Value::Null,
    }
}

// ---------------------------------------------------------------------
// Query plans
// ---------------------------------------------------------------------

/// One SELECT target.
pub(crate) struct Target {
    /// The output column name.
    pub name: String,
    /// Unique key under which intermediate rows store this target's value
    /// (output names may repeat; keys never do).
    pub key: String,
    pub node: Node,
    /// Hidden targets back GROUP/ORDER/PARTITION/PIVOT references and are
    /// stripped at projection.
    pub visible: bool,
    /// Window attachments reachable under this target.
    pub windows: Vec<Rc<WindowExpr>>,
}

/// A compiled ORDER BY key.
pub(crate) struct OrderKey {
    pub target: usize,
    pub desc: bool,
    pub nulls_first: bool,
}

/// Compound arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetOpKind {
    Union,
    Intersect,
    Except,
}

/// The base relation and joins of a query.
pub(crate) struct FromPlan {
    pub table: Table,
    pub alias: String,
    pub joins: Vec<JoinStep>,
}

/// Join kinds after lowering (CROSS with ON became INNER).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Anti,
}

/// One lowered join.
pub(crate) struct JoinStep {
    pub kind: JoinKind,
    pub alias: String,
    pub table: Table,
    /// The full ON condition (already includes rewritten USING equalities).
    pub condition: Option<Node>,
    /// Equi-join fast path: (left keys, right keys) when the condition is a
    /// clean conjunction of cross-side equalities.
    pub equi: Option<(Vec<Node>, Vec<Node>)>,
}

/// A compiled query.
pub struct QueryPlan {
    pub(crate) targets: Vec<Target>,
    pub(crate) from: Option<FromPlan>,
    pub(crate) where_clause: Option<Node>,
    /// Target indices of the group keys.
    pub(crate) group_by: Vec<usize>,
    /// Whether the query groups (aggregate targets or explicit GROUP BY).
    pub(crate) grouped: bool,
    /// Target index of the HAVING predicate.
    pub(crate) having: Option<usize>,
    /// Non-window aggregates, in handle order.
    pub(crate) aggregates: Vec<Rc<AggregateExpr>>,
    /// All window attachments of the query.
    pub(crate) windows: Vec<Rc<WindowExpr>>,
    pub(crate) order_by: Vec<OrderKey>,
    /// Pivot axes as target indices `(a, b)`.
    pub(crate) pivot: Option<(usize, usize)>,
    pub(crate) distinct: bool,
    pub(crate) limit: Option<Node>,
    pub(crate) offset: Option<Node>,
    pub(crate) compounds: Vec<(SetOpKind, bool, Rc<QueryPlan>)>,
    /// Whether the plan reads outer scopes (correlated subquery body).
    pub(crate) correlated: bool,
}

impl QueryPlan {
    /// The visible output schema.
    #[must_use]
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.targets
            .iter()
            .filter(|t| t.visible)
            .map(|t| ColumnSchema {
                name: t.name.clone(),
                dtype: t.node.dtype(),
            })
            .collect()
    }
}

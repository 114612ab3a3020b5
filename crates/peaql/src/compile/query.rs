//! Query lowering: SELECT cores, joins, grouping, windows, pivot and
//! compound queries.

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use peaql_parser::ast::{
    self, Expr, FrameBound, FrameExclusion, FrameUnits, JoinConstraint, JoinType, NullOrdering,
    OrderDirection, Select, SelectItem, SetOp, TableRef, WindowSpec,
};

use super::expr::{compile_expr, compile_standalone_expr, dispatch_call, PendingWindows};
use super::{Compiler, Rel, Scope};
use crate::catalog::Table;
use crate::error::{Error, Result};
use crate::plan::{
    ExcludeMode, FrameMode, FramePlan, FromPlan, JoinKind, JoinStep, Node, OrderKey, QueryPlan,
    SetOpKind, Target, WindowExpr, WindowOrderKey,
};

/// The open target list of a select core under compilation.
struct TargetList {
    items: Vec<(Option<Expr>, Target)>,
}

impl TargetList {
    fn new() -> Self {
        Self { items: Vec::new() }
    }

    fn visible_len(&self) -> usize {
        self.items.iter().filter(|(_, t)| t.visible).count()
    }

    /// Appends a target, deriving a unique internal key from the name.
    fn push(&mut self, ast: Option<Expr>, name: String, node: Node, visible: bool) -> usize {
        let index = self.items.len();
        let key = if self.items.iter().any(|(_, t)| t.key == name) {
            format!("{name}:{index}")
        } else {
            name.clone()
        };
        self.items.push((
            ast,
            Target {
                name,
                key,
                node,
                visible,
                windows: Vec::new(),
            },
        ));
        index
    }

    /// Lowers an index-or-expression clause entry to a target index,
    /// reusing structurally equal targets and appending hidden ones.
    fn lower_key(
        &mut self,
        c: &Compiler,
        scope: &Scope,
        expr: &Expr,
        clause: &str,
    ) -> Result<usize> {
        if let Expr::Literal(ast::Literal::Integer(n)) = expr {
            let visible = self.visible_len();
            if *n < 1 || *n > visible as i64 {
                return Err(Error::compile(format!(
                    "{clause} position {n} is not in the select list"
                )));
            }
            return Ok((*n - 1) as usize);
        }
        if let Some(index) = self
            .items
            .iter()
            .position(|(ast, _)| ast.as_ref().is_some_and(|ast| ast.same_shape(expr)))
        {
            return Ok(index);
        }
        let node = compile_standalone_expr(c, scope, expr)?;
        let name = derive_name(expr, self.items.len());
        Ok(self.push(Some(expr.clone()), name, node, false))
    }
}

/// Derives an output column name from a target expression.
fn derive_name(expr: &Expr, index: usize) -> String {
    match expr {
        Expr::Column { name, .. } | Expr::Attribute { name, .. } => name.clone(),
        Expr::Function(call) => call.name.to_ascii_lowercase(),
        Expr::Method { call, .. } => call.name.to_ascii_lowercase(),
        Expr::Cast { expr, .. } => derive_name(expr, index),
        _ => format!("column{}", index + 1),
    }
}

fn contains_aggregate(node: &Node) -> bool {
    let mut found = false;
    node.visit(&mut |n| match n {
        Node::Aggregate(_) => {
            found = true;
            true
        }
        // Window attachments are not group aggregates themselves.
        Node::Window(_) => true,
        _ => true,
    });
    found
}

fn contains_column(node: &Node) -> bool {
    let mut found = false;
    node.visit(&mut |n| {
        if matches!(n, Node::Column(_)) {
            found = true;
        }
        true
    });
    found
}

fn reject_aggregates(node: &Node, context: &str) -> Result<()> {
    let mut found = false;
    node.visit(&mut |n| {
        if matches!(n, Node::Aggregate(_) | Node::Window(_)) {
            found = true;
        }
        true
    });
    if found {
        return Err(Error::compile(format!(
            "aggregate functions are not allowed in {context}"
        )));
    }
    Ok(())
}

/// Compiles a full query (CTEs, select core, compound arms, ordering) into
/// a plan. The caller provides the fresh scope frame for this query.
pub(crate) fn compile_query(
    c: &Compiler,
    scope: &Scope,
    query: &ast::Query,
) -> Result<Rc<QueryPlan>> {
    for cte in &query.with {
        let cte_scope = scope.detached();
        let plan = compile_query(c, &cte_scope, &cte.query)?;
        let table = Table::derived(cte.name.clone(), plan);
        scope.ctes.borrow_mut().insert(cte.name.clone(), table);
    }

    let (mut plan, target_asts) = compile_select_core(c, scope, &query.select)?;

    let mut compounds = Vec::new();
    for arm in &query.compounds {
        let arm_scope = Scope {
            ctx: scope.ctx,
            ctes: std::cell::RefCell::new(scope.ctes.borrow().clone()),
            rel: std::cell::RefCell::new(None),
            parent: scope.parent,
            correlated: std::cell::Cell::new(false),
        };
        let (arm_plan, _) = compile_select_core(c, &arm_scope, &arm.select)?;
        if arm_scope.correlated.get() {
            scope.correlated.set(true);
        }
        let left_arity = plan.schema().len();
        let right_arity = arm_plan.schema().len();
        if left_arity != right_arity {
            return Err(Error::compile(format!(
                "each side of a compound query must return the same number of columns ({left_arity} vs {right_arity})"
            )));
        }
        let op = match arm.op {
            SetOp::Union => SetOpKind::Union,
            SetOp::Intersect => SetOpKind::Intersect,
            SetOp::Except => SetOpKind::Except,
        };
        compounds.push((op, arm.all, Rc::new(arm_plan)));
    }
    plan.compounds = compounds;

    // ORDER BY lowers against the first core's target list.
    if !query.order_by.is_empty() {
        let mut targets = TargetList {
            items: target_asts
                .into_iter()
                .zip(plan.targets.drain(..))
                .collect(),
        };
        let mut order_by = Vec::new();
        for entry in &query.order_by {
            let target = targets.lower_key(c, scope, &entry.expr, "ORDER BY")?;
            let desc = entry.direction == OrderDirection::Desc;
            // Default null placement follows the direction: last for ASC,
            // first for DESC.
            let nulls_first = match entry.nulls {
                Some(NullOrdering::First) => true,
                Some(NullOrdering::Last) => false,
                None => desc,
            };
            if !plan.compounds.is_empty() && !targets.items[target].1.visible {
                return Err(Error::compile(
                    "ORDER BY expressions in compound queries must appear in the select list",
                ));
            }
            order_by.push(OrderKey {
                target,
                desc,
                nulls_first,
            });
        }
        plan.targets = targets.items.into_iter().map(|(_, t)| t).collect();
        plan.order_by = order_by;
        collect_aggregates(&mut plan);
        if !plan.aggregates.is_empty() {
            plan.grouped = true;
        }
    }

    if let Some(limit) = &query.limit {
        let node = compile_standalone_expr(c, scope, limit)?;
        reject_aggregates(&node, "LIMIT")?;
        plan.limit = Some(node);
    }
    if let Some(offset) = &query.offset {
        let node = compile_standalone_expr(c, scope, offset)?;
        reject_aggregates(&node, "OFFSET")?;
        plan.offset = Some(node);
    }

    plan.correlated = scope.correlated.get();
    Ok(Rc::new(plan))
}

/// Compiles one select core into a plan without ordering/limit/compounds,
/// returning the target ASTs alongside for later ORDER BY lowering.
#[allow(clippy::too_many_lines)]
fn compile_select_core(
    c: &Compiler,
    scope: &Scope,
    select: &Select,
) -> Result<(QueryPlan, Vec<Option<Expr>>)> {
    let from = compile_from(c, scope, select)?;

    let where_clause = match &select.where_clause {
        Some(predicate) => {
            let node = compile_standalone_expr(c, scope, predicate)?;
            reject_aggregates(&node, "WHERE")?;
            Some(node)
        }
        None => None,
    };

    // Target expansion and compilation; OVER attachments land in `pending`.
    let mut targets = TargetList::new();
    let mut pending: PendingWindows = Vec::new();
    for item in &select.targets {
        expand_target(c, scope, &mut targets, &mut pending, item)?;
    }

    // GROUP BY lowering.
    let mut group_by = Vec::new();
    for key in &select.group_by {
        let index = targets.lower_key(c, scope, key, "GROUP BY")?;
        if contains_aggregate(&targets.items[index].1.node) {
            return Err(Error::compile(
                "aggregate functions are not allowed in GROUP BY",
            ));
        }
        if !group_by.contains(&index) {
            group_by.push(index);
        }
    }

    let mut grouped = !group_by.is_empty()
        || targets
            .items
            .iter()
            .any(|(_, t)| contains_aggregate(&t.node));

    // HAVING compiles as a hidden aggregate-capable target.
    let having = match &select.having {
        Some(predicate) => {
            let node = compile_standalone_expr(c, scope, predicate)?;
            grouped = grouped || contains_aggregate(&node);
            let index = targets.push(None, "having".into(), node, false);
            Some(index)
        }
        None => None,
    };

    // Implicit group-by: non-aggregate targets become keys, or errors in
    // strict mode.
    if grouped {
        let missing: Vec<usize> = targets
            .items
            .iter()
            .enumerate()
            .filter(|(index, (_, t))| {
                t.visible
                    && !group_by.contains(index)
                    && !contains_aggregate(&t.node)
                    && t.windows.is_empty()
                    && contains_column(&t.node)
            })
            .map(|(index, _)| index)
            .collect();
        for index in missing {
            let windowed = pending
                .iter()
                .any(|(w, _)| target_mentions_window(&targets.items[index].1.node, w));
            if windowed {
                continue;
            }
            if c.options.implicit_group_by {
                group_by.push(index);
            } else {
                return Err(Error::compile(format!(
                    "column \"{}\" must appear in the GROUP BY clause or be used in an aggregate function",
                    targets.items[index].1.name
                )));
            }
        }
    }

    // Window lowering now that the target list exists.
    let mut windows = Vec::new();
    for (window, spec) in pending {
        lower_window(c, scope, &mut targets, select, &window, &spec)?;
        windows.push(window);
    }
    for (_, target) in &mut targets.items {
        let mut mentioned = Vec::new();
        for window in &windows {
            if target_mentions_window(&target.node, window) {
                mentioned.push(Rc::clone(window));
            }
        }
        target.windows = mentioned;
    }

    // PIVOT BY: exactly two distinct axes, the second a group key.
    let pivot = if select.pivot_by.is_empty() {
        None
    } else {
        if select.pivot_by.len() != 2 {
            return Err(Error::compile("PIVOT BY requires exactly two axes"));
        }
        let a = targets.lower_key(c, scope, &select.pivot_by[0], "PIVOT BY")?;
        let b = targets.lower_key(c, scope, &select.pivot_by[1], "PIVOT BY")?;
        if a == b {
            return Err(Error::compile("PIVOT BY axes must differ"));
        }
        if !group_by.contains(&b) {
            return Err(Error::compile(
                "the second PIVOT BY axis must be a GROUP BY key",
            ));
        }
        Some((a, b))
    };

    let (target_asts, target_items): (Vec<Option<Expr>>, Vec<Target>) =
        targets.items.into_iter().unzip();

    let mut plan = QueryPlan {
        targets: target_items,
        from,
        where_clause,
        group_by,
        grouped,
        having,
        aggregates: Vec::new(),
        windows,
        order_by: Vec::new(),
        pivot,
        distinct: select.distinct,
        limit: None,
        offset: None,
        compounds: Vec::new(),
        correlated: false,
    };
    collect_aggregates(&mut plan);
    trace!(
        targets = plan.targets.len(),
        grouped = plan.grouped,
        aggregates = plan.aggregates.len(),
        windows = plan.windows.len(),
        "compiled select core"
    );
    Ok((plan, target_asts))
}

/// Re-walks the target list and collects non-window aggregates in stable
/// handle order.
fn collect_aggregates(plan: &mut QueryPlan) {
    let mut aggregates: Vec<Rc<crate::plan::AggregateExpr>> = Vec::new();
    for target in &plan.targets {
        target.node.visit(&mut |node| {
            if let Node::Aggregate(agg) = node {
                if !aggregates.iter().any(|seen| Rc::ptr_eq(seen, agg)) {
                    aggregates.push(Rc::clone(agg));
                }
            }
            true
        });
    }
    plan.aggregates = aggregates;
}

fn target_mentions_window(node: &Node, window: &Rc<WindowExpr>) -> bool {
    let mut found = false;
    node.visit(&mut |n| {
        if let Node::Window(w) = n {
            if Rc::ptr_eq(w, window) {
                found = true;
            }
        }
        true
    });
    found
}

// ---------------------------------------------------------------------
// FROM / JOIN lowering
// ---------------------------------------------------------------------

fn resolve_table_ref(c: &Compiler, scope: &Scope, table: &TableRef) -> Result<(String, Table)> {
    match table {
        TableRef::Named { name, alias, span } => {
            let found = scope.find_table(name).ok_or_else(|| {
                Error::compile_at(format!("table \"{name}\" does not exist"), *span)
            })?;
            let binding = alias.clone().unwrap_or_else(|| name.clone());
            Ok((binding.clone(), found.with_name(binding)))
        }
        TableRef::Subquery { query, alias } => {
            let Some(alias) = alias else {
                return Err(Error::compile("subquery in FROM must have an alias"));
            };
            let sub_scope = scope.detached();
            let plan = compile_query(c, &sub_scope, query)?;
            Ok((alias.clone(), Table::derived(alias.clone(), plan)))
        }
    }
}

fn compile_from(c: &Compiler, scope: &Scope, select: &Select) -> Result<Option<FromPlan>> {
    let base = match &select.from {
        Some(table) => Some(resolve_table_ref(c, scope, table)?),
        None => match scope.ctx.default_table() {
            Some(name) if select.from.is_none() && !select.targets.is_empty() => scope
                .find_table(name)
                .map(|table| (name.to_string(), table)),
            _ => None,
        },
    };

    let Some((alias, table)) = base else {
        if !select.joins.is_empty() {
            return Err(Error::compile("JOIN requires a FROM relation"));
        }
        return Ok(None);
    };

    *scope.rel.borrow_mut() = Some(Rel {
        alias: alias.clone(),
        table: table.clone(),
        joins: IndexMap::new(),
    });

    let mut steps = Vec::new();
    for join in &select.joins {
        let (join_alias, join_table) = resolve_table_ref(c, scope, &join.table)?;

        // USING lowers to equalities between the two sides; the left side
        // resolves before the right relation is registered so the shared
        // column name stays unambiguous.
        let using_pairs = if let JoinConstraint::Using(columns) = &join.constraint {
            let mut pairs = Vec::new();
            for column in columns {
                let left = scope.lookup(None, column, false)?.ok_or_else(|| {
                    Error::compile(format!("USING column \"{column}\" does not exist"))
                })?;
                pairs.push((column.clone(), left));
            }
            Some(pairs)
        } else {
            None
        };

        {
            let mut rel = scope.rel.borrow_mut();
            if let Some(rel) = rel.as_mut() {
                if rel.alias == join_alias || rel.joins.contains_key(&join_alias) {
                    return Err(Error::compile(format!(
                        "table name \"{join_alias}\" specified more than once"
                    )));
                }
                rel.joins.insert(join_alias.clone(), join_table.clone());
            }
        }

        let condition = match &join.constraint {
            JoinConstraint::On(predicate) => {
                let node = compile_standalone_expr(c, scope, predicate)?;
                reject_aggregates(&node, "JOIN conditions")?;
                Some(node)
            }
            JoinConstraint::Using(columns) => {
                let mut conjuncts = Vec::new();
                let pairs = using_pairs.unwrap_or_default();
                for ((column, left), _) in pairs.into_iter().zip(columns) {
                    let right = scope.lookup(Some(&join_alias), &column, false)?.ok_or_else(
                        || {
                            Error::compile(format!(
                                "USING column \"{column}\" does not exist in \"{join_alias}\""
                            ))
                        },
                    )?;
                    conjuncts.push(dispatch_call("=", vec![left, right])?);
                }
                Some(Node::And(conjuncts))
            }
            JoinConstraint::None => None,
        };

        // CROSS JOIN with an ON condition behaves like INNER.
        let kind = match (join.join_type, condition.is_some()) {
            (JoinType::Cross, true) | (JoinType::Inner, _) => JoinKind::Inner,
            (JoinType::Cross, false) => JoinKind::Cross,
            (JoinType::Left, _) => JoinKind::Left,
            (JoinType::Right, _) => JoinKind::Right,
            (JoinType::Full, _) => JoinKind::Full,
            (JoinType::Anti, _) => JoinKind::Anti,
        };

        let (condition, equi) = split_equi_join(condition, &join_alias);

        steps.push(JoinStep {
            kind,
            alias: join_alias,
            table: join_table,
            condition,
            equi,
        });
    }

    Ok(Some(FromPlan {
        table,
        alias,
        joins: steps,
    }))
}

/// Recognizes the equi-join fast path: a conjunction of equalities between
/// plain column references split cleanly between the two sides.
fn split_equi_join(
    condition: Option<Node>,
    right_alias: &str,
) -> (Option<Node>, Option<(Vec<Node>, Vec<Node>)>) {
    let Some(condition) = condition else {
        return (None, None);
    };
    let conjuncts = match condition {
        Node::And(items) => items,
        other => vec![other],
    };

    let is_right = |node: &Node| {
        matches!(node, Node::Column(col) if col.scope.as_deref() == Some(right_alias))
    };
    let is_left = |node: &Node| {
        matches!(node, Node::Column(col) if col.scope.as_deref() != Some(right_alias))
    };

    let clean = conjuncts.iter().all(|conjunct| match conjunct {
        Node::Call(call) if call.name == "=" && call.args.len() == 2 => {
            (is_left(&call.args[0]) && is_right(&call.args[1]))
                || (is_right(&call.args[0]) && is_left(&call.args[1]))
        }
        _ => false,
    });

    if !clean {
        let condition = if conjuncts.len() == 1 {
            conjuncts.into_iter().next()
        } else {
            Some(Node::And(conjuncts))
        };
        return (condition, None);
    }

    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    for conjunct in conjuncts {
        let Node::Call(call) = conjunct else {
            continue;
        };
        let mut args = call.args;
        let second = args.pop();
        let first = args.pop();
        if let (Some(first), Some(second)) = (first, second) {
            if is_right(&first) {
                right_keys.push(first);
                left_keys.push(second);
            } else {
                left_keys.push(first);
                right_keys.push(second);
            }
        }
    }
    (None, Some((left_keys, right_keys)))
}

// ---------------------------------------------------------------------
// Target expansion
// ---------------------------------------------------------------------

fn expand_target(
    c: &Compiler,
    scope: &Scope,
    targets: &mut TargetList,
    pending: &mut PendingWindows,
    item: &SelectItem,
) -> Result<()> {
    match &item.expr {
        Expr::Wildcard { table: None } => {
            let rel = scope.rel.borrow();
            let Some(rel) = rel.as_ref() else {
                return Err(Error::compile("SELECT * requires a FROM relation"));
            };
            for column in rel.table.wildcard_columns() {
                let node = Node::Column(crate::plan::ColumnRef {
                    scope: None,
                    field: column.name.clone(),
                    dtype: column.dtype.clone(),
                });
                targets.push(
                    Some(Expr::column(column.name.clone())),
                    column.name.clone(),
                    node,
                    true,
                );
            }
            for (alias, join_table) in &rel.joins {
                for column in join_table.wildcard_columns() {
                    let node = Node::Column(crate::plan::ColumnRef {
                        scope: Some(alias.clone()),
                        field: column.name.clone(),
                        dtype: column.dtype.clone(),
                    });
                    targets.push(
                        Some(Expr::qualified(alias.clone(), column.name.clone())),
                        column.name.clone(),
                        node,
                        true,
                    );
                }
            }
            Ok(())
        }
        Expr::Wildcard { table: Some(name) } => {
            // A relation alias, or a structured column whose attributes
            // expand.
            let rel = scope.rel.borrow();
            if let Some(rel) = rel.as_ref() {
                let source = if rel.alias == *name {
                    Some((None, &rel.table))
                } else {
                    rel.joins.get(name).map(|t| (Some(name.clone()), t))
                };
                if let Some((alias, table)) = source {
                    for column in table.wildcard_columns() {
                        let node = Node::Column(crate::plan::ColumnRef {
                            scope: alias.clone(),
                            field: column.name.clone(),
                            dtype: column.dtype.clone(),
                        });
                        let ast = match &alias {
                            Some(alias) => Expr::qualified(alias.clone(), column.name.clone()),
                            None => Expr::column(column.name.clone()),
                        };
                        targets.push(Some(ast), column.name.clone(), node, true);
                    }
                    return Ok(());
                }
            }
            drop(rel);
            // Structured column: expand its attribute list with tbl.col
            // style names.
            let Some(base) = scope.lookup(None, name, false)? else {
                return Err(Error::compile(format!("relation \"{name}\" does not exist")));
            };
            let attrs = crate::types::attributes(&base.dtype());
            if attrs.is_empty() {
                return Err(Error::compile(format!(
                    "\"{name}\" is not a relation or structured column"
                )));
            }
            for attr in attrs {
                let node = Node::Attribute {
                    expr: Box::new(scope.lookup(None, name, false)?.ok_or_else(|| {
                        Error::Internal(format!("column {name} vanished during expansion"))
                    })?),
                    name: attr.name.to_string(),
                    dtype: attr.dtype.clone(),
                };
                targets.push(
                    None,
                    format!("{name}.{}", attr.name),
                    node,
                    true,
                );
            }
            Ok(())
        }
        expr => {
            let node = compile_expr(c, scope, &mut Some(pending), expr)?;
            let name = item
                .alias
                .clone()
                .unwrap_or_else(|| derive_name(expr, targets.items.len()));
            targets.push(Some(expr.clone()), name, node, true);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------
// Window lowering
// ---------------------------------------------------------------------

/// Resolves named-window references: fields explicitly provided at the
/// reference site override the base window's.
fn resolve_window_spec(select: &Select, spec: &WindowSpec) -> Result<WindowSpec> {
    let mut merged = spec.clone();
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(base_name) = merged.base.take() {
        if !seen.insert(base_name.clone()) {
            return Err(Error::compile(format!(
                "circular WINDOW reference: \"{base_name}\""
            )));
        }
        let Some((_, base)) = select.windows.iter().find(|(name, _)| *name == base_name)
        else {
            return Err(Error::compile(format!(
                "window \"{base_name}\" does not exist"
            )));
        };
        if merged.partition_by.is_empty() {
            merged.partition_by = base.partition_by.clone();
        }
        if merged.order_by.is_empty() {
            merged.order_by = base.order_by.clone();
        }
        if merged.frame.is_none() {
            merged.frame = base.frame.clone();
        }
        merged.base = base.base.clone();
    }
    Ok(merged)
}

fn frame_offset(c: &Compiler, scope: &Scope, bound: &FrameBound) -> Result<(f64, bool)> {
    match bound {
        FrameBound::UnboundedPreceding | FrameBound::UnboundedFollowing => {
            Ok((f64::INFINITY, false))
        }
        FrameBound::CurrentRow => Ok((0.0, false)),
        FrameBound::Preceding(expr) | FrameBound::Following(expr) => {
            let node = compile_standalone_expr(c, scope, expr)?;
            let Node::Constant(value) = &node else {
                return Err(Error::compile("frame bounds must be constants"));
            };
            let Some(offset) = value.as_f64() else {
                return Err(Error::compile("frame bounds must be numeric constants"));
            };
            if offset < 0.0 {
                return Err(Error::compile("frame bounds cannot be negative"));
            }
            Ok((offset, true))
        }
    }
}

fn lower_window(
    c: &Compiler,
    scope: &Scope,
    targets: &mut TargetList,
    select: &Select,
    window: &Rc<WindowExpr>,
    spec: &WindowSpec,
) -> Result<()> {
    let spec = resolve_window_spec(select, spec)?;

    let mut partition = Vec::new();
    for key in &spec.partition_by {
        partition.push(targets.lower_key(c, scope, key, "PARTITION BY")?);
    }

    let mut order = Vec::new();
    for entry in &spec.order_by {
        let target = targets.lower_key(c, scope, &entry.expr, "window ORDER BY")?;
        order.push(WindowOrderKey {
            target,
            desc: entry.direction == OrderDirection::Desc,
        });
    }

    let frame = match &spec.frame {
        None => FramePlan {
            mode: FrameMode::Range,
            preceding: f64::INFINITY,
            // SQL default: with ORDER BY the frame ends at the current
            // row's peers, without it the whole partition is in frame.
            following: if order.is_empty() { f64::INFINITY } else { 0.0 },
            exclude: ExcludeMode::None,
        },
        Some(frame) => {
            let mode = match frame.units {
                FrameUnits::Rows => FrameMode::Rows,
                FrameUnits::Groups => FrameMode::Groups,
                FrameUnits::Range => FrameMode::Range,
            };
            let (preceding, start_offset) = match &frame.start {
                FrameBound::Following(_) => {
                    return Err(Error::compile(
                        "frame start cannot be FOLLOWING with an offset",
                    ));
                }
                bound => frame_offset(c, scope, bound)?,
            };
            let (following, end_offset) = match &frame.end {
                FrameBound::Preceding(_) => {
                    return Err(Error::compile(
                        "frame end cannot be PRECEDING with an offset",
                    ));
                }
                FrameBound::UnboundedPreceding => {
                    return Err(Error::compile("frame end cannot be UNBOUNDED PRECEDING"));
                }
                bound => frame_offset(c, scope, bound)?,
            };
            let exclude = match frame.exclude {
                FrameExclusion::NoOthers => ExcludeMode::None,
                FrameExclusion::CurrentRow => ExcludeMode::Current,
                FrameExclusion::Group => ExcludeMode::Group,
                FrameExclusion::Ties => ExcludeMode::Ties,
            };

            if mode == FrameMode::Range && (start_offset || end_offset) {
                if order.len() != 1 {
                    return Err(Error::compile(
                        "RANGE with offset PRECEDING/FOLLOWING requires exactly one ORDER BY column",
                    ));
                }
                let key_type = targets.items[order[0].target].1.node.dtype();
                if !key_type.is_range_orderable() {
                    return Err(Error::compile(format!(
                        "RANGE with offset PRECEDING/FOLLOWING is not supported for column type {}",
                        key_type.name()
                    )));
                }
            }

            FramePlan {
                mode,
                preceding,
                following,
                exclude,
            }
        }
    };

    *window.partition.borrow_mut() = partition;
    *window.order.borrow_mut() = order;
    window.frame.set(frame);
    Ok(())
}

// ---------------------------------------------------------------------
// RETURNING support (used by DML lowering)
// ---------------------------------------------------------------------

/// Compiles a RETURNING target list against a single table.
pub(crate) fn compile_returning(
    c: &Compiler,
    scope: &Scope,
    items: &[SelectItem],
) -> Result<Vec<Target>> {
    let mut targets = TargetList::new();
    let mut pending: PendingWindows = Vec::new();
    for item in items {
        expand_target(c, scope, &mut targets, &mut pending, item)?;
    }
    if !pending.is_empty() {
        return Err(Error::compile(
            "window functions are not allowed in RETURNING",
        ));
    }
    for (_, target) in &targets.items {
        reject_aggregates(&target.node, "RETURNING")?;
    }
    Ok(targets.items.into_iter().map(|(_, t)| t).collect())
}


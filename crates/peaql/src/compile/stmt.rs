//! DDL/DML lowering: CREATE/DROP TABLE, INSERT, UPDATE, DELETE.

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use peaql_parser::ast::{self, InsertSource, TableConstraint};
use peaql_parser::Span;

use super::expr::compile_standalone_expr;
use super::query::{compile_query, compile_returning};
use super::{Compiler, Rel, Scope};
use crate::catalog::{resolve_type_name, Column, Constraint, ConstraintKind, Context, Table};
use crate::error::{Error, Result};
use crate::plan::{
    CreateTablePlan, DeletePlan, DropTablePlan, InsertPlan, InsertSourcePlan, Node, Plan,
    UpdatePlan,
};
use crate::types::DType;

/// Whether a value of `from` can be stored into a column of type `to`,
/// directly or through the registered cast.
fn storable(from: &DType, to: &DType) -> bool {
    if to.accepts(from) || matches!(from, DType::Object) {
        return true;
    }
    match (from, to) {
        (DType::List(from_elem), DType::List(to_elem)) => storable(from_elem, to_elem),
        (DType::List(_), _) | (_, DType::List(_)) => false,
        // Scalar-to-scalar conversions go through the cast at runtime;
        // failures surface as data errors there.
        _ => true,
    }
}

/// A scope whose only relation is the given table (INSERT/UPDATE/DELETE
/// expressions and RETURNING resolve against it).
fn table_scope<'a>(ctx: &'a Context, table: &Table) -> Scope<'a> {
    let scope = Scope::root(ctx);
    *scope.rel.borrow_mut() = Some(Rel {
        alias: table.name().to_string(),
        table: table.clone(),
        joins: IndexMap::new(),
    });
    scope
}

pub(super) fn compile_create_table(
    c: &Compiler,
    ctx: &mut Context,
    create: &ast::CreateTable,
) -> Result<Plan> {
    if ctx.table(&create.name).is_some() {
        if create.if_not_exists {
            debug!(table = create.name, "CREATE TABLE IF NOT EXISTS: table exists");
            return Ok(Plan::CreateTable(CreateTablePlan::noop()));
        }
        return Err(Error::compile_at(
            format!("relation \"{}\" already exists", create.name),
            create.span,
        ));
    }

    // The AS query compiles first so its schema can supply missing columns.
    let as_query = match &create.as_query {
        Some(query) => {
            let scoped = ctx.clone();
            let scope = Scope::root(&scoped);
            Some(compile_query(c, &scope, query)?)
        }
        None => None,
    };

    let mut columns = Vec::new();
    if create.columns.is_empty() {
        if let Some(plan) = &as_query {
            for schema_column in plan.schema() {
                columns.push(Column::new(schema_column.name, schema_column.dtype));
            }
        }
    }
    for def in &create.columns {
        let mut dtype = resolve_type_name(&def.type_name)?;
        if def.is_array {
            dtype = DType::List(Box::new(dtype));
        }
        let mut column = Column::new(def.name.clone(), dtype);
        if let Some(default) = &def.default {
            let scope = table_scope(ctx, &Table::new(create.name.clone(), Vec::new()));
            let node = compile_standalone_expr(c, &scope, default)?;
            if !storable(&node.dtype(), &column.dtype) {
                return Err(Error::compile(format!(
                    "default for column \"{}\" is of type {} but the column is of type {}",
                    def.name,
                    node.dtype().name(),
                    column.dtype.name()
                )));
            }
            column.default = Some(Rc::new(node));
        }
        columns.push(column);
    }

    let mut table = Table::new(create.name.clone(), columns);

    let mut constraints = Vec::new();
    for def in &create.columns {
        if def.not_null || def.primary_key {
            constraints.push(Constraint {
                name: format!("{}_{}_not_null", create.name, def.name),
                column: Some(def.name.clone()),
                kind: ConstraintKind::NotNull,
            });
        }
        if let Some(check) = &def.check {
            let node = super::compile_table_expr_ast(&table, check)?;
            constraints.push(Constraint {
                name: format!("{}_{}_check", create.name, def.name),
                column: Some(def.name.clone()),
                kind: ConstraintKind::Check {
                    expr: Rc::new(node),
                    text: check.to_string(),
                },
            });
        }
        if def.unique || def.primary_key {
            let suffix = if def.primary_key { "pkey" } else { "key" };
            constraints.push(Constraint {
                name: format!("{}_{}_{suffix}", create.name, def.name),
                column: Some(def.name.clone()),
                kind: ConstraintKind::Unique {
                    columns: vec![def.name.clone()],
                },
            });
        }
    }
    for table_constraint in &create.constraints {
        match table_constraint {
            TableConstraint::Check { name, expr } => {
                let node = super::compile_table_expr_ast(&table, expr)?;
                // Unnamed checks borrow the first referenced column for the
                // generated name, matching the inline style.
                let generated = name.clone().unwrap_or_else(|| {
                    first_column_name(expr).map_or_else(
                        || format!("{}_check", create.name),
                        |col| format!("{}_{col}_check", create.name),
                    )
                });
                constraints.push(Constraint {
                    name: generated,
                    column: None,
                    kind: ConstraintKind::Check {
                        expr: Rc::new(node),
                        text: expr.to_string(),
                    },
                });
            }
            TableConstraint::Unique { name, columns } => {
                constraints.push(Constraint {
                    name: name.clone().unwrap_or_else(|| {
                        format!("{}_{}_key", create.name, columns.join("_"))
                    }),
                    column: None,
                    kind: ConstraintKind::Unique {
                        columns: columns.clone(),
                    },
                });
            }
            TableConstraint::PrimaryKey { name, columns } => {
                for column in columns {
                    constraints.push(Constraint {
                        name: format!("{}_{column}_not_null", create.name),
                        column: Some(column.clone()),
                        kind: ConstraintKind::NotNull,
                    });
                }
                constraints.push(Constraint {
                    name: name.clone().unwrap_or_else(|| format!("{}_pkey", create.name)),
                    column: None,
                    kind: ConstraintKind::Unique {
                        columns: columns.clone(),
                    },
                });
            }
            TableConstraint::ForeignKey {
                name,
                columns,
                ref_table,
                ref_columns,
            } => {
                constraints.push(Constraint {
                    name: name.clone().unwrap_or_else(|| {
                        format!("{}_{}_fkey", create.name, columns.join("_"))
                    }),
                    column: None,
                    kind: ConstraintKind::ForeignKey {
                        columns: columns.clone(),
                        ref_table: ref_table.clone(),
                        ref_columns: ref_columns.clone(),
                    },
                });
            }
        }
    }
    // Unknown columns in constraints are compile errors.
    for constraint in &constraints {
        if let Some(column) = &constraint.column {
            if table.column(column).is_none() {
                return Err(Error::compile(format!(
                    "column \"{column}\" named in constraint \"{}\" does not exist",
                    constraint.name
                )));
            }
        }
    }
    table.set_constraints(constraints);

    // Schema effects apply at compile time so later statements in the
    // block resolve the new table; seeding happens at resolve time.
    ctx.add_table(table.clone());
    debug!(table = create.name, "created table");

    Ok(Plan::CreateTable(CreateTablePlan::new(table, as_query)))
}

/// Picks the first column referenced by a constraint expression, for
/// generated names.
fn first_column_name(expr: &ast::Expr) -> Option<String> {
    match expr {
        ast::Expr::Column { name, .. } => Some(name.clone()),
        ast::Expr::Binary { left, right, .. } => {
            first_column_name(left).or_else(|| first_column_name(right))
        }
        ast::Expr::Unary { operand, .. } => first_column_name(operand),
        ast::Expr::Function(call) => call.args.iter().find_map(first_column_name),
        ast::Expr::IsNull { expr, .. }
        | ast::Expr::Attribute { expr, .. }
        | ast::Expr::Cast { expr, .. } => first_column_name(expr),
        ast::Expr::Between { expr, low, high, .. } => first_column_name(expr)
            .or_else(|| first_column_name(low))
            .or_else(|| first_column_name(high)),
        _ => None,
    }
}

pub(super) fn compile_drop_table(
    ctx: &mut Context,
    name: &str,
    if_exists: bool,
    span: Span,
) -> Result<Plan> {
    if ctx.table(name).is_none() {
        if if_exists {
            return Ok(Plan::DropTable(DropTablePlan::new(name)));
        }
        return Err(Error::compile_at(
            format!("table \"{name}\" does not exist"),
            span,
        ));
    }
    ctx.remove_table(name);
    debug!(table = name, "dropped table");
    Ok(Plan::DropTable(DropTablePlan::new(name)))
}

fn require_table(ctx: &Context, name: &str, span: Span) -> Result<Table> {
    ctx.table(name)
        .cloned()
        .ok_or_else(|| Error::compile_at(format!("table \"{name}\" does not exist"), span))
}

pub(super) fn compile_insert(
    c: &Compiler,
    ctx: &mut Context,
    insert: &ast::Insert,
) -> Result<Plan> {
    let table = require_table(ctx, &insert.table, insert.span)?;

    // The insert column list defaults to all columns in declared order.
    let columns: Vec<String> = if insert.columns.is_empty() {
        table.columns().map(|col| col.name.clone()).collect()
    } else {
        for column in &insert.columns {
            if table.column(column).is_none() {
                return Err(Error::compile_at(
                    format!(
                        "column \"{column}\" of relation \"{}\" does not exist",
                        insert.table
                    ),
                    insert.span,
                ));
            }
        }
        insert.columns.clone()
    };

    let source = match &insert.source {
        InsertSource::Values(rows) => {
            let scope = Scope::root(ctx);
            let mut compiled_rows = Vec::with_capacity(rows.len());
            for row in rows {
                if row.len() != columns.len() {
                    return Err(Error::compile_at(
                        format!(
                            "INSERT has {} expressions but {} target columns",
                            row.len(),
                            columns.len()
                        ),
                        insert.span,
                    ));
                }
                let mut nodes = Vec::with_capacity(row.len());
                for (column, expr) in columns.iter().zip(row) {
                    let node = compile_standalone_expr(c, &scope, expr)?;
                    let target = table
                        .column(column)
                        .ok_or_else(|| Error::Internal(format!("column {column} vanished")))?;
                    if !storable(&node.dtype(), &target.dtype) {
                        return Err(Error::compile(format!(
                            "column \"{column}\" is of type {} but the expression is of type {}",
                            target.dtype.name(),
                            node.dtype().name()
                        )));
                    }
                    nodes.push(node);
                }
                compiled_rows.push(nodes);
            }
            InsertSourcePlan::Values(compiled_rows)
        }
        InsertSource::Query(query) => {
            let scoped = ctx.clone();
            let scope = Scope::root(&scoped);
            let plan = compile_query(c, &scope, query)?;
            let arity = plan.schema().len();
            if arity != columns.len() {
                return Err(Error::compile_at(
                    format!(
                        "INSERT query returns {arity} columns but {} are expected",
                        columns.len()
                    ),
                    insert.span,
                ));
            }
            InsertSourcePlan::Query(plan)
        }
    };

    let returning = if insert.returning.is_empty() {
        None
    } else {
        let scope = table_scope(ctx, &table);
        Some(compile_returning(c, &scope, &insert.returning)?)
    };

    Ok(Plan::Insert(InsertPlan::new(table, columns, source, returning)))
}

pub(super) fn compile_update(
    c: &Compiler,
    ctx: &mut Context,
    update: &ast::Update,
) -> Result<Plan> {
    let table = require_table(ctx, &update.table, update.span)?;
    let scope = table_scope(ctx, &table);

    let mut assignments = Vec::with_capacity(update.assignments.len());
    for (column, expr) in &update.assignments {
        let Some(target) = table.column(column) else {
            return Err(Error::compile_at(
                format!(
                    "column \"{column}\" of relation \"{}\" does not exist",
                    update.table
                ),
                update.span,
            ));
        };
        let node = compile_standalone_expr(c, &scope, expr)?;
        if !storable(&node.dtype(), &target.dtype) {
            return Err(Error::compile(format!(
                "column \"{column}\" is of type {} but the expression is of type {}",
                target.dtype.name(),
                node.dtype().name()
            )));
        }
        assignments.push((column.clone(), target.dtype.clone(), node));
    }

    let filter = compile_dml_filter(c, &scope, update.where_clause.as_ref())?;
    let returning = if update.returning.is_empty() {
        None
    } else {
        Some(compile_returning(c, &scope, &update.returning)?)
    };

    Ok(Plan::Update(UpdatePlan::new(table, assignments, filter, returning)))
}

pub(super) fn compile_delete(
    c: &Compiler,
    ctx: &mut Context,
    delete: &ast::Delete,
) -> Result<Plan> {
    let table = require_table(ctx, &delete.table, delete.span)?;
    let scope = table_scope(ctx, &table);
    let filter = compile_dml_filter(c, &scope, delete.where_clause.as_ref())?;
    let returning = if delete.returning.is_empty() {
        None
    } else {
        Some(compile_returning(c, &scope, &delete.returning)?)
    };
    Ok(Plan::Delete(DeletePlan::new(table, filter, returning)))
}

fn compile_dml_filter(
    c: &Compiler,
    scope: &Scope,
    predicate: Option<&ast::Expr>,
) -> Result<Option<Node>> {
    let Some(predicate) = predicate else {
        return Ok(None);
    };
    let node = compile_standalone_expr(c, scope, predicate)?;
    let mut has_aggregate = false;
    node.visit(&mut |n| {
        if matches!(n, Node::Aggregate(_) | Node::Window(_)) {
            has_aggregate = true;
        }
        true
    });
    if has_aggregate {
        return Err(Error::compile("aggregate functions are not allowed in WHERE"));
    }
    Ok(Some(node))
}

//! The compiler: AST → typed evaluation plan against a catalog.
//!
//! A [`Scope`] is one name-resolution frame: the current relation (FROM base
//! plus accumulated joins), CTEs, and a parent link for correlated
//! subqueries. Resolution that climbs past a frame marks it correlated, so
//! subquery plans know whether their results may be cached.

mod expr;
mod query;
mod stmt;

use std::cell::{Cell, RefCell};

use indexmap::IndexMap;
use tracing::debug;

use peaql_parser::ast::{Expr, Statement};
use peaql_parser::{Parser, Span};

use crate::catalog::{CompileOptions, Context, Parameters, PreparedStatement, Table};
use crate::error::{Error, Result};
use crate::plan::{ColumnRef, Node, Plan};
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, Eq)]
enum PlaceholderStyle {
    Unset,
    Positional,
    Named,
}

/// Cross-statement compile state: options, parameters and placeholder
/// bookkeeping.
pub(crate) struct Compiler<'a> {
    pub(crate) params: &'a Parameters,
    pub(crate) options: CompileOptions,
    style: Cell<PlaceholderStyle>,
    max_positional: Cell<usize>,
}

impl<'a> Compiler<'a> {
    fn new(params: &'a Parameters, options: CompileOptions) -> Self {
        Self {
            params,
            options,
            style: Cell::new(PlaceholderStyle::Unset),
            max_positional: Cell::new(0),
        }
    }

    /// Binds one placeholder to its parameter value.
    pub(crate) fn bind_parameter(
        &self,
        name: Option<&str>,
        position: usize,
        span: Span,
    ) -> Result<Value> {
        let style = if name.is_some() {
            PlaceholderStyle::Named
        } else {
            PlaceholderStyle::Positional
        };
        match self.style.get() {
            PlaceholderStyle::Unset => self.style.set(style),
            current if current != style => {
                return Err(Error::Programming(
                    "cannot mix positional and named placeholders in one query".into(),
                ));
            }
            _ => {}
        }

        match name {
            Some(name) => match self.params {
                Parameters::Named(map) => map.get(name).cloned().ok_or_else(|| {
                    Error::Programming(format!("missing value for parameter :{name}"))
                }),
                _ => Err(Error::Programming(format!(
                    "parameter :{name} requires named parameters"
                ))),
            },
            None => match self.params {
                Parameters::Positional(values) => {
                    self.max_positional.set(self.max_positional.get().max(position));
                    values.get(position - 1).cloned().ok_or_else(|| {
                        Error::Programming(format!(
                            "missing value for parameter {position} (got {})",
                            values.len()
                        ))
                    })
                }
                _ => Err(Error::compile_at(
                    "positional placeholder requires positional parameters",
                    span,
                )),
            },
        }
    }

    fn check_parameter_arity(&self) -> Result<()> {
        if let Parameters::Positional(values) = self.params {
            let used = self.max_positional.get();
            if used != values.len() {
                return Err(Error::Programming(format!(
                    "query uses {used} positional parameters but {} were provided",
                    values.len()
                )));
            }
        }
        Ok(())
    }
}

/// The current relation of a scope: the FROM base plus accumulated joins.
pub(crate) struct Rel {
    pub(crate) alias: String,
    pub(crate) table: Table,
    pub(crate) joins: IndexMap<String, Table>,
}

/// One name-resolution frame.
///
/// `ctes` and `rel` sit behind `RefCell` so the query compiler can install
/// CTEs and the FROM relation while parent frames hold shared references.
pub(crate) struct Scope<'a> {
    pub(crate) ctx: &'a Context,
    pub(crate) ctes: RefCell<IndexMap<String, Table>>,
    pub(crate) rel: RefCell<Option<Rel>>,
    pub(crate) parent: Option<&'a Scope<'a>>,
    pub(crate) correlated: Cell<bool>,
}

impl<'a> Scope<'a> {
    pub(crate) fn root(ctx: &'a Context) -> Self {
        Self {
            ctx,
            ctes: RefCell::new(IndexMap::new()),
            rel: RefCell::new(None),
            parent: None,
            correlated: Cell::new(false),
        }
    }

    /// A child frame for a correlated subquery.
    pub(crate) fn child(&self) -> Scope<'_> {
        Scope {
            ctx: self.ctx,
            ctes: RefCell::new(self.ctes.borrow().clone()),
            rel: RefCell::new(None),
            parent: Some(self),
            correlated: Cell::new(false),
        }
    }

    /// An unparented frame for FROM subqueries and CTE bodies, which do not
    /// see the enclosing row.
    pub(crate) fn detached(&self) -> Scope<'a> {
        Scope {
            ctx: self.ctx,
            ctes: RefCell::new(self.ctes.borrow().clone()),
            rel: RefCell::new(None),
            parent: None,
            correlated: Cell::new(false),
        }
    }

    /// Finds a table by name: CTEs shadow catalog tables.
    pub(crate) fn find_table(&self, name: &str) -> Option<Table> {
        if let Some(table) = self.ctes.borrow().get(name) {
            return Some(table.clone());
        }
        if let Some(parent) = self.parent {
            if let Some(table) = parent.ctes.borrow().get(name) {
                return Some(table.clone());
            }
        }
        self.ctx.table(name).cloned()
    }

    /// Resolves a column reference, climbing to outer frames for
    /// correlation. `qualify_base` scopes base-table hits through the
    /// frame's alias (required once resolution crossed a frame boundary,
    /// since outer rows reach inner contexts as scope fragments).
    pub(crate) fn lookup(
        &self,
        qualifier: Option<&str>,
        name: &str,
        qualify_base: bool,
    ) -> Result<Option<Node>> {
        let rel_guard = self.rel.borrow();
        if let Some(rel) = rel_guard.as_ref() {
            match qualifier {
                Some(q) => {
                    if q == rel.alias {
                        if let Some(column) = rel.table.column(name) {
                            return Ok(Some(Node::Column(ColumnRef {
                                scope: Some(q.to_string()),
                                field: name.to_string(),
                                dtype: column.dtype.clone(),
                            })));
                        }
                    }
                    if let Some(join_table) = rel.joins.get(q) {
                        if let Some(column) = join_table.column(name) {
                            return Ok(Some(Node::Column(ColumnRef {
                                scope: Some(q.to_string()),
                                field: name.to_string(),
                                dtype: column.dtype.clone(),
                            })));
                        }
                    }
                }
                None => {
                    let base_hit = rel.table.column(name);
                    let join_hits: Vec<(&String, &Table)> = rel
                        .joins
                        .iter()
                        .filter(|(_, table)| table.column(name).is_some())
                        .collect();
                    match (base_hit, join_hits.len()) {
                        (Some(column), 0) => {
                            let scope = if qualify_base {
                                Some(rel.alias.clone())
                            } else {
                                None
                            };
                            return Ok(Some(Node::Column(ColumnRef {
                                scope,
                                field: name.to_string(),
                                dtype: column.dtype.clone(),
                            })));
                        }
                        (None, 1) => {
                            let (alias, table) = join_hits[0];
                            let column = table.column(name).ok_or_else(|| {
                                Error::Internal(format!("join column {name} vanished"))
                            })?;
                            return Ok(Some(Node::Column(ColumnRef {
                                scope: Some(alias.clone()),
                                field: name.to_string(),
                                dtype: column.dtype.clone(),
                            })));
                        }
                        (None, 0) => {}
                        _ => {
                            return Err(Error::compile(format!(
                                "column reference \"{name}\" is ambiguous"
                            )));
                        }
                    }
                }
            }
        }
        drop(rel_guard);

        match self.parent {
            Some(parent) => {
                let found = parent.lookup(qualifier, name, true)?;
                if found.is_some() {
                    self.correlated.set(true);
                }
                Ok(found)
            }
            None => Ok(None),
        }
    }
}

/// Compiles a prepared statement's statements into a plan.
///
/// Queries compile against a shallow catalog copy; DDL/DML compile against
/// (and apply their schema effects to) the live catalog, so later
/// statements in the block resolve newly created tables.
pub(crate) fn compile_statements(
    ctx: &mut Context,
    prepared: &PreparedStatement,
    params: &Parameters,
    options: CompileOptions,
) -> Result<Plan> {
    let compiler = Compiler::new(params, options);
    let mut plans = Vec::new();

    debug!(statements = prepared.statements.len(), "compiling statement block");
    for statement in &prepared.statements {
        match statement {
            Statement::Query(query) => {
                let scoped = ctx.clone();
                let scope = Scope::root(&scoped);
                let plan = query::compile_query(&compiler, &scope, query)?;
                plans.push(Plan::Query(plan));
            }
            Statement::CreateTable(create) => {
                plans.push(stmt::compile_create_table(&compiler, ctx, create)?);
            }
            Statement::DropTable {
                name,
                if_exists,
                span,
            } => {
                plans.push(stmt::compile_drop_table(ctx, name, *if_exists, *span)?);
            }
            Statement::Insert(insert) => {
                plans.push(stmt::compile_insert(&compiler, ctx, insert)?);
            }
            Statement::Update(update) => {
                plans.push(stmt::compile_update(&compiler, ctx, update)?);
            }
            Statement::Delete(delete) => {
                plans.push(stmt::compile_delete(&compiler, ctx, delete)?);
            }
            Statement::Set { .. } => {
                // Harvested at prepare time; nothing to compile.
            }
        }
    }

    compiler.check_parameter_arity()?;

    if plans.len() == 1 {
        Ok(plans.pop().unwrap_or(Plan::Statements(Vec::new())))
    } else {
        Ok(Plan::Statements(plans))
    }
}

/// Parses and compiles an expression against a single table, for constraint
/// and default expressions (used by DDL and the JSON table loader).
pub(crate) fn compile_table_expr(table: &Table, text: &str) -> Result<Node> {
    let mut parser = Parser::new(text);
    let ast = parser
        .parse_expression(0)
        .map_err(|e| Error::Parse(vec![e]))?;
    compile_table_expr_ast(table, &ast)
}

/// Compiles an already-parsed expression against a single table.
pub(crate) fn compile_table_expr_ast(table: &Table, ast: &Expr) -> Result<Node> {
    let ctx = Context::new();
    let scope = Scope::root(&ctx);
    *scope.rel.borrow_mut() = Some(Rel {
        alias: table.name().to_string(),
        table: table.clone(),
        joins: IndexMap::new(),
    });
    let compiler = Compiler::new(&Parameters::None, CompileOptions::default());
    let node = expr::compile_standalone_expr(&compiler, &scope, ast)?;
    let mut has_aggregate = false;
    node.visit(&mut |n| {
        if matches!(n, Node::Aggregate(_) | Node::Window(_)) {
            has_aggregate = true;
        }
        true
    });
    if has_aggregate {
        return Err(Error::compile(
            "aggregates are not allowed in constraint expressions",
        ));
    }
    Ok(node)
}

//! Side-effecting statement plans: CREATE/DROP TABLE, INSERT, UPDATE,
//! DELETE.
//!
//! Schema effects (registering/removing tables) already happened at compile
//! time against the live catalog; resolving these plans applies the data
//! effects through the shared row storage.

use std::rc::Rc;

use tracing::debug;

use crate::catalog::{coerce, Table};
use crate::error::{Error, Result};
use crate::row::Record;
use crate::value::Value;

use super::{ColumnSchema, Node, Output, QueryPlan, ResultSet, Target};

/// Builds the evaluation record for one table row: the row's fields plus a
/// scope under the table's name so qualified references resolve.
fn table_row_context(table: &Table, row: &Record) -> Record {
    let mut record = row.clone();
    record.add_scope(table.name().to_string(), row.as_scope());
    record
}

/// Evaluates a RETURNING target list over a set of affected rows.
fn returning_rows(
    table: &Table,
    targets: &[Target],
    affected: &[Record],
) -> Result<ResultSet> {
    let columns: Vec<ColumnSchema> = targets
        .iter()
        .filter(|t| t.visible)
        .map(|t| ColumnSchema {
            name: t.name.clone(),
            dtype: t.node.dtype(),
        })
        .collect();
    let mut rows = Vec::with_capacity(affected.len());
    for record in affected {
        let context = table_row_context(table, record);
        let mut row = Vec::with_capacity(columns.len());
        for target in targets.iter().filter(|t| t.visible) {
            row.push(target.node.resolve(&context)?.normalized());
        }
        rows.push(row);
    }
    Ok(ResultSet { columns, rows })
}

fn invalidate(targets: &Option<Vec<Target>>) {
    if let Some(targets) = targets {
        for target in targets {
            target.node.invalidate_subqueries();
        }
    }
}

/// A compiled CREATE TABLE. The table itself was registered at compile
/// time; resolve seeds `AS <query>` data.
pub struct CreateTablePlan {
    table: Option<Table>,
    as_query: Option<Rc<QueryPlan>>,
}

impl CreateTablePlan {
    pub(crate) fn new(table: Table, as_query: Option<Rc<QueryPlan>>) -> Self {
        Self {
            table: Some(table),
            as_query,
        }
    }

    /// An IF NOT EXISTS hit: nothing to do at resolve time.
    pub(crate) fn noop() -> Self {
        Self {
            table: None,
            as_query: None,
        }
    }

    pub(crate) fn resolve(&self) -> Result<Output> {
        let (Some(table), Some(query)) = (&self.table, &self.as_query) else {
            return Ok(Output::Count(0));
        };
        let result = query.resolve(None)?;
        let storage = table
            .storage()
            .ok_or_else(|| Error::Internal("created table has no row storage".into()))?;
        let mut seeded = Vec::with_capacity(result.rows.len());
        for row in result.rows {
            let mut record = Record::new();
            for (column, value) in table.columns().zip(row) {
                record.set(column.name.clone(), coerce(value, &column.dtype)?);
            }
            table.check_row(&record)?;
            seeded.push(record);
        }
        let count = seeded.len();
        *storage.borrow_mut() = seeded;
        debug!(table = table.name(), rows = count, "seeded table from query");
        Ok(Output::Count(count))
    }
}

/// A compiled DROP TABLE; the removal happened at compile time.
pub struct DropTablePlan {
    name: String,
}

impl DropTablePlan {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn resolve(&self) -> Result<Output> {
        debug!(table = self.name, "dropped table");
        Ok(Output::Count(0))
    }
}

/// The row source of a compiled INSERT.
pub(crate) enum InsertSourcePlan {
    Values(Vec<Vec<Node>>),
    Query(Rc<QueryPlan>),
}

/// A compiled INSERT.
pub struct InsertPlan {
    table: Table,
    /// Target columns, in insert order.
    columns: Vec<String>,
    source: InsertSourcePlan,
    returning: Option<Vec<Target>>,
}

impl InsertPlan {
    pub(crate) fn new(
        table: Table,
        columns: Vec<String>,
        source: InsertSourcePlan,
        returning: Option<Vec<Target>>,
    ) -> Self {
        Self {
            table,
            columns,
            source,
            returning,
        }
    }

    pub(crate) fn resolve(&self) -> Result<Output> {
        invalidate(&self.returning);
        let storage = self
            .table
            .storage()
            .ok_or_else(|| Error::Internal("INSERT target has no row storage".into()))?;

        let value_rows: Vec<Vec<Value>> = match &self.source {
            InsertSourcePlan::Values(rows) => {
                let empty = Record::new();
                let mut out = Vec::with_capacity(rows.len());
                for nodes in rows {
                    nodes.iter().for_each(Node::invalidate_subqueries);
                    let mut row = Vec::with_capacity(nodes.len());
                    for node in nodes {
                        row.push(node.resolve(&empty)?);
                    }
                    out.push(row);
                }
                out
            }
            InsertSourcePlan::Query(plan) => plan.resolve(None)?.rows,
        };

        let mut inserted = Vec::with_capacity(value_rows.len());
        for values in value_rows {
            let mut record = Record::new();
            for column in self.table.columns() {
                let provided = self
                    .columns
                    .iter()
                    .position(|name| *name == column.name)
                    .and_then(|i| values.get(i).cloned());
                let value = match provided {
                    Some(value) => coerce(value, &column.dtype)?,
                    None => match &column.default {
                        Some(default) => {
                            coerce(default.resolve(&Record::new())?, &column.dtype)?
                        }
                        None => Value::Null,
                    },
                };
                record.set(column.name.clone(), value);
            }
            // Constraints run per row before the row is appended; earlier
            // rows of the same statement stay inserted on failure.
            self.table.check_row(&record)?;
            storage.borrow_mut().push(record.clone());
            inserted.push(record);
        }

        debug!(table = self.table.name(), rows = inserted.len(), "inserted rows");
        match &self.returning {
            Some(targets) => Ok(Output::Rows(returning_rows(
                &self.table,
                targets,
                &inserted,
            )?)),
            None => Ok(Output::Count(inserted.len())),
        }
    }
}

/// A compiled UPDATE.
pub struct UpdatePlan {
    table: Table,
    /// `(column, declared type, value expression)`.
    assignments: Vec<(String, crate::types::DType, Node)>,
    filter: Option<Node>,
    returning: Option<Vec<Target>>,
}

impl UpdatePlan {
    pub(crate) fn new(
        table: Table,
        assignments: Vec<(String, crate::types::DType, Node)>,
        filter: Option<Node>,
        returning: Option<Vec<Target>>,
    ) -> Self {
        Self {
            table,
            assignments,
            filter,
            returning,
        }
    }

    pub(crate) fn resolve(&self) -> Result<Output> {
        invalidate(&self.returning);
        if let Some(filter) = &self.filter {
            filter.invalidate_subqueries();
        }
        for (_, _, node) in &self.assignments {
            node.invalidate_subqueries();
        }
        let storage = self
            .table
            .storage()
            .ok_or_else(|| Error::Internal("UPDATE target has no row storage".into()))?;

        let len = storage.borrow().len();
        let mut updated = Vec::new();
        for index in 0..len {
            let current = storage.borrow()[index].clone();
            let context = table_row_context(&self.table, &current);
            if let Some(filter) = &self.filter {
                if filter.resolve(&context)?.truthy() != Some(true) {
                    continue;
                }
            }
            let mut replacement = current.clone();
            for (column, dtype, node) in &self.assignments {
                let value = coerce(node.resolve(&context)?, dtype)?;
                replacement.set(column.clone(), value);
            }
            self.table.check_row_at(&replacement, Some(index))?;
            storage.borrow_mut()[index] = replacement.clone();
            updated.push(replacement);
        }

        debug!(table = self.table.name(), rows = updated.len(), "updated rows");
        match &self.returning {
            Some(targets) => Ok(Output::Rows(returning_rows(&self.table, targets, &updated)?)),
            None => Ok(Output::Count(updated.len())),
        }
    }
}

/// A compiled DELETE.
pub struct DeletePlan {
    table: Table,
    filter: Option<Node>,
    returning: Option<Vec<Target>>,
}

impl DeletePlan {
    pub(crate) fn new(table: Table, filter: Option<Node>, returning: Option<Vec<Target>>) -> Self {
        Self {
            table,
            filter,
            returning,
        }
    }

    pub(crate) fn resolve(&self) -> Result<Output> {
        invalidate(&self.returning);
        if let Some(filter) = &self.filter {
            filter.invalidate_subqueries();
        }
        let storage = self
            .table
            .storage()
            .ok_or_else(|| Error::Internal("DELETE target has no row storage".into()))?;

        let rows = storage.borrow().clone();
        let mut kept = Vec::with_capacity(rows.len());
        let mut removed = Vec::new();
        for record in rows {
            let matched = match &self.filter {
                Some(filter) => {
                    let context = table_row_context(&self.table, &record);
                    filter.resolve(&context)?.truthy() == Some(true)
                }
                None => true,
            };
            if matched {
                removed.push(record);
            } else {
                kept.push(record);
            }
        }
        *storage.borrow_mut() = kept;

        debug!(table = self.table.name(), rows = removed.len(), "deleted rows");
        match &self.returning {
            Some(targets) => Ok(Output::Rows(returning_rows(&self.table, targets, &removed)?)),
            None => Ok(Output::Count(removed.len())),
        }
    }
}

//! The catalog: named tables, settings and statement preparation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use peaql_parser::ast::Statement;
use peaql_parser::{IdentifierQuoting, ParseError, Parser, ParserOptions};

use crate::error::{Error, Result};
use crate::plan::{Output, Plan, QueryPlan};
use crate::registry::registry;
use crate::row::Record;
use crate::types::DType;
use crate::value::Value;

/// A table column: name, declared type and optional default.
#[derive(Clone)]
pub struct Column {
    /// The column name.
    pub name: String,
    /// The declared type.
    pub dtype: DType,
    /// Compiled DEFAULT expression, evaluated against an empty row.
    pub(crate) default: Option<Rc<crate::plan::Node>>,
}

impl Column {
    /// Creates a column with no default.
    #[must_use]
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
            default: None,
        }
    }
}

/// The flavor of a constraint.
#[derive(Clone)]
pub(crate) enum ConstraintKind {
    /// NOT NULL on one column.
    NotNull,
    /// A compiled boolean CHECK expression, with its source text for the
    /// JSON round trip.
    Check {
        expr: Rc<crate::plan::Node>,
        text: String,
    },
    /// UNIQUE over a column tuple.
    Unique { columns: Vec<String> },
    /// FOREIGN KEY metadata; carried but not enforced.
    ForeignKey {
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
    },
}

/// A named table constraint.
#[derive(Clone)]
pub struct Constraint {
    /// The constraint name, declared or generated.
    pub name: String,
    /// The constrained column, for column-level constraints.
    pub column: Option<String>,
    pub(crate) kind: ConstraintKind,
}

/// Row storage: materialized rows or a derived query.
#[derive(Clone)]
pub(crate) enum TableData {
    Rows(Rc<RefCell<Vec<Record>>>),
    Derived(Rc<QueryPlan>),
}

/// A named, in-memory table.
///
/// Cloning a table is shallow: clones share row storage, so a plan compiled
/// against a catalog copy still observes DML applied through the original.
#[derive(Clone)]
pub struct Table {
    name: String,
    columns: IndexMap<String, Column>,
    /// Columns selected by `*`; `None` means all.
    wildcard: Option<Vec<String>>,
    constraints: Rc<Vec<Constraint>>,
    data: TableData,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}

impl Table {
    /// Creates an empty table from a column list.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(|c| (c.name.clone(), c)).collect(),
            wildcard: None,
            constraints: Rc::new(Vec::new()),
            data: TableData::Rows(Rc::new(RefCell::new(Vec::new()))),
        }
    }

    /// Creates a table from records, inferring column types from the first
    /// non-null value seen per field.
    #[must_use]
    pub fn from_records(name: impl Into<String>, records: Vec<Record>) -> Self {
        let mut columns: IndexMap<String, Column> = IndexMap::new();
        for record in &records {
            for (field, value) in record.iter() {
                match columns.get(field) {
                    None => {
                        columns.insert(field.clone(), Column::new(field.clone(), value.dtype()));
                    }
                    Some(existing) if existing.dtype == DType::Null && !value.is_null() => {
                        columns.insert(field.clone(), Column::new(field.clone(), value.dtype()));
                    }
                    Some(_) => {}
                }
            }
        }
        let mut table = Self {
            name: name.into(),
            columns,
            wildcard: None,
            constraints: Rc::new(Vec::new()),
            data: TableData::Rows(Rc::new(RefCell::new(records))),
        };
        // Columns that never saw a non-null value stay dynamic.
        for column in table.columns.values_mut() {
            if column.dtype == DType::Null {
                column.dtype = DType::Object;
            }
        }
        table
    }

    /// A table backed by a compiled query (CTE, FROM subquery).
    #[must_use]
    pub(crate) fn derived(name: impl Into<String>, plan: Rc<QueryPlan>) -> Self {
        let columns: IndexMap<String, Column> = plan
            .schema()
            .into_iter()
            .map(|c| (c.name.clone(), Column::new(c.name, c.dtype)))
            .collect();
        Self {
            name: name.into(),
            columns,
            wildcard: None,
            constraints: Rc::new(Vec::new()),
            data: TableData::Derived(plan),
        }
    }

    /// The table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the table (e.g. when aliased in FROM).
    #[must_use]
    pub(crate) fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Installs the constraint list.
    pub(crate) fn set_constraints(&mut self, constraints: Vec<Constraint>) {
        self.constraints = Rc::new(constraints);
    }

    /// The table's constraints.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Looks up a column.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// All columns in declared order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    /// Number of columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// The columns `*` expands to.
    #[must_use]
    pub fn wildcard_columns(&self) -> Vec<&Column> {
        match &self.wildcard {
            Some(names) => names
                .iter()
                .filter_map(|name| self.columns.get(name))
                .collect(),
            None => self.columns.values().collect(),
        }
    }

    /// Restricts the wildcard column set.
    pub fn set_wildcard(&mut self, names: Vec<String>) {
        self.wildcard = Some(names);
    }

    /// Materializes the table's rows. Derived tables execute their plan,
    /// seeing `outer` for correlation.
    pub(crate) fn rows(&self, outer: Option<&Record>) -> Result<Vec<Record>> {
        match &self.data {
            TableData::Rows(rows) => Ok(rows.borrow().clone()),
            TableData::Derived(plan) => {
                let result = plan.resolve(outer)?;
                let names: Vec<String> =
                    result.columns.iter().map(|c| c.name.clone()).collect();
                Ok(result
                    .rows
                    .into_iter()
                    .map(|row| Record::from_pairs(names.iter().cloned().zip(row)))
                    .collect())
            }
        }
    }

    /// Direct row storage, for DML. Derived tables have none.
    pub(crate) fn storage(&self) -> Option<Rc<RefCell<Vec<Record>>>> {
        match &self.data {
            TableData::Rows(rows) => Some(Rc::clone(rows)),
            TableData::Derived(_) => None,
        }
    }

    /// Renders a row tuple for data-error messages: `(a, 55)`.
    fn render_row(&self, record: &Record) -> String {
        let cells: Vec<String> = self
            .columns
            .keys()
            .map(|name| match record.get(name) {
                None | Some(Value::Null) => "null".to_string(),
                Some(value) => value.to_string(),
            })
            .collect();
        format!("({})", cells.join(", "))
    }

    /// Checks every constraint against a candidate row.
    ///
    /// # Errors
    ///
    /// [`Error::Data`] with a SQL-style constraint-violation message naming
    /// the failing row.
    pub(crate) fn check_row(&self, record: &Record) -> Result<()> {
        self.check_row_at(record, None)
    }

    /// As [`Table::check_row`], ignoring the stored row at `skip` in UNIQUE
    /// checks (an UPDATE must not collide with the row it replaces).
    pub(crate) fn check_row_at(&self, record: &Record, skip: Option<usize>) -> Result<()> {
        for constraint in self.constraints.iter() {
            match &constraint.kind {
                ConstraintKind::NotNull => {
                    let column = constraint.column.as_deref().unwrap_or_default();
                    let value = record.get(column).cloned().unwrap_or(Value::Null);
                    if value.is_null() {
                        return Err(Error::Data(format!(
                            "Failing row contains {}. null value in column \"{column}\" of relation \"{}\" violates not-null constraint",
                            self.render_row(record),
                            self.name,
                        )));
                    }
                }
                ConstraintKind::Check { expr, .. } => {
                    if expr.resolve(record)?.truthy() == Some(false) {
                        return Err(Error::Data(format!(
                            "Failing row contains {}. new row for relation \"{}\" violates check constraint \"{}\"",
                            self.render_row(record),
                            self.name,
                            constraint.name,
                        )));
                    }
                }
                ConstraintKind::Unique { columns } => {
                    let key: Vec<_> = columns
                        .iter()
                        .map(|c| record.get(c).cloned().unwrap_or(Value::Null).key())
                        .collect();
                    // Nulls never collide under UNIQUE.
                    if key.iter().any(|k| matches!(k, crate::value::Key::Null)) {
                        continue;
                    }
                    let TableData::Rows(rows) = &self.data else {
                        continue;
                    };
                    let clash = rows.borrow().iter().enumerate().any(|(index, existing)| {
                        skip != Some(index)
                            && columns
                                .iter()
                                .map(|c| existing.get(c).cloned().unwrap_or(Value::Null).key())
                                .collect::<Vec<_>>()
                                == key
                    });
                    if clash {
                        return Err(Error::Data(format!(
                            "Failing row contains {}. duplicate key value violates unique constraint \"{}\"",
                            self.render_row(record),
                            constraint.name,
                        )));
                    }
                }
                ConstraintKind::ForeignKey { .. } => {}
            }
        }
        Ok(())
    }

    /// Serializes the table to the persisted JSON model.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let columns: Vec<serde_json::Value> = self
            .columns
            .values()
            .map(|c| {
                let type_name = match &c.dtype {
                    DType::List(elem) => format!("{}[]", elem.name()),
                    other => other.name().to_string(),
                };
                serde_json::json!({ "name": c.name, "type": type_name })
            })
            .collect();

        let constraints: Vec<serde_json::Value> = self
            .constraints
            .iter()
            .map(|c| {
                let mut entry = serde_json::Map::new();
                entry.insert("name".into(), c.name.clone().into());
                if let Some(column) = &c.column {
                    entry.insert("column".into(), column.clone().into());
                }
                match &c.kind {
                    ConstraintKind::NotNull => {
                        let column = c.column.clone().unwrap_or_default();
                        entry.insert("expr".into(), format!("{column} IS NOT NULL").into());
                    }
                    ConstraintKind::Check { text, .. } => {
                        entry.insert("expr".into(), text.clone().into());
                    }
                    ConstraintKind::Unique { columns } => {
                        entry.insert("expr".into(), serde_json::Value::Null);
                        entry.insert("columns".into(), columns.clone().into());
                    }
                    ConstraintKind::ForeignKey {
                        columns,
                        ref_table,
                        ref_columns,
                    } => {
                        entry.insert("expr".into(), serde_json::Value::Null);
                        entry.insert("columns".into(), columns.clone().into());
                        entry.insert(
                            "references".into(),
                            serde_json::json!({ "table": ref_table, "columns": ref_columns }),
                        );
                    }
                }
                serde_json::Value::Object(entry)
            })
            .collect();

        let data: Vec<serde_json::Value> = match &self.data {
            TableData::Rows(rows) => rows
                .borrow()
                .iter()
                .map(|record| {
                    let mut row = serde_json::Map::new();
                    for (field, value) in record.iter() {
                        row.insert(field.clone(), value.to_json());
                    }
                    serde_json::Value::Object(row)
                })
                .collect(),
            TableData::Derived(_) => Vec::new(),
        };

        serde_json::json!({
            "name": self.name,
            "columns": columns,
            "constraints": constraints,
            "data": data,
        })
    }

    /// Loads a table from the persisted JSON model, re-parsing and
    /// recompiling constraint expressions and validating every data row
    /// against the declared types and constraints.
    ///
    /// # Errors
    ///
    /// Compile errors for malformed constraint expressions, data errors for
    /// rows that fail coercion or constraints.
    pub fn from_json(model: &serde_json::Value) -> Result<Self> {
        let name = model
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::Programming("table model is missing \"name\"".into()))?;

        let mut columns = Vec::new();
        for column in model
            .get("columns")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| Error::Programming("table model is missing \"columns\"".into()))?
        {
            let column_name = column
                .get("name")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| Error::Programming("column model is missing \"name\"".into()))?;
            let type_name = column
                .get("type")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| Error::Programming("column model is missing \"type\"".into()))?;
            let dtype = resolve_type_name(type_name)?;
            columns.push(Column::new(column_name, dtype));
        }

        let mut table = Self::new(name, columns);

        let mut constraints = Vec::new();
        if let Some(entries) = model.get("constraints").and_then(serde_json::Value::as_array) {
            for entry in entries {
                let constraint_name = entry
                    .get("name")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let column = entry
                    .get("column")
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string);
                if let Some(text) = entry.get("expr").and_then(serde_json::Value::as_str) {
                    let node = crate::compile::compile_table_expr(&table, text)?;
                    let kind = match &node {
                        crate::plan::Node::IsNull { negated: true, .. } if column.is_some() => {
                            ConstraintKind::NotNull
                        }
                        _ => ConstraintKind::Check {
                            expr: Rc::new(node),
                            text: text.to_string(),
                        },
                    };
                    constraints.push(Constraint {
                        name: constraint_name,
                        column,
                        kind,
                    });
                } else if let Some(cols) = entry.get("columns").and_then(serde_json::Value::as_array)
                {
                    let columns: Vec<String> = cols
                        .iter()
                        .filter_map(serde_json::Value::as_str)
                        .map(ToString::to_string)
                        .collect();
                    let kind = match entry.get("references") {
                        Some(refs) => ConstraintKind::ForeignKey {
                            columns: columns.clone(),
                            ref_table: refs
                                .get("table")
                                .and_then(serde_json::Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            ref_columns: refs
                                .get("columns")
                                .and_then(serde_json::Value::as_array)
                                .map(|cols| {
                                    cols.iter()
                                        .filter_map(serde_json::Value::as_str)
                                        .map(ToString::to_string)
                                        .collect()
                                })
                                .unwrap_or_default(),
                        },
                        None => ConstraintKind::Unique { columns },
                    };
                    constraints.push(Constraint {
                        name: constraint_name,
                        column,
                        kind,
                    });
                }
            }
        }
        table.set_constraints(constraints);

        if let Some(rows) = model.get("data").and_then(serde_json::Value::as_array) {
            for row in rows {
                let Some(fields) = row.as_object() else {
                    return Err(Error::Data("table data rows must be objects".into()));
                };
                let mut record = Record::new();
                for column in table.columns.values() {
                    let raw = fields
                        .get(&column.name)
                        .map_or(Value::Null, Value::from_json);
                    let value = coerce(raw, &column.dtype)?;
                    record.set(column.name.clone(), value);
                }
                table.check_row(&record)?;
                if let Some(storage) = table.storage() {
                    storage.borrow_mut().push(record);
                }
            }
        }

        Ok(table)
    }
}

/// Resolves a declared type name (`STRING`, `integer`, `text[]`, …) through
/// the cast-name registry.
pub(crate) fn resolve_type_name(name: &str) -> Result<DType> {
    if let Some(elem) = name.strip_suffix("[]") {
        return Ok(DType::List(Box::new(resolve_type_name(elem)?)));
    }
    registry()
        .cast_type(name)
        .cloned()
        .ok_or_else(|| Error::compile(format!("unknown type name: {name}")))
}

/// Coerces a value to a declared column type, trying the registered cast
/// before failing.
///
/// # Errors
///
/// [`Error::Data`] when the value neither classifies as nor casts to the
/// target type.
pub(crate) fn coerce(value: Value, dtype: &DType) -> Result<Value> {
    if value.is_null() || dtype.classifies(&value) {
        return Ok(value);
    }
    if let DType::List(elem) = dtype {
        if let Value::List(items) | Value::Set(items) = &value {
            let coerced: Result<Vec<Value>> = items
                .iter()
                .map(|item| coerce(item.clone(), elem))
                .collect();
            return Ok(Value::List(coerced?));
        }
    }
    let cast = crate::functions::cast_to(&value, dtype);
    if cast.is_null() {
        return Err(Error::Data(format!(
            "invalid input value for type {}: '{value}'",
            dtype.name()
        )));
    }
    Ok(cast)
}

/// Statement parameters: none, all-positional or all-named.
#[derive(Debug, Clone, Default)]
pub enum Parameters {
    /// No placeholders expected.
    #[default]
    None,
    /// Values for `?` placeholders, in order.
    Positional(Vec<Value>),
    /// Values for `:name` placeholders.
    Named(HashMap<String, Value>),
}

/// Engine-level compile options.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Auto-add non-aggregate SELECT targets as group keys. Disabling
    /// enforces strict SQL grouping.
    pub implicit_group_by: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            implicit_group_by: true,
        }
    }
}

/// A parsed statement text with harvested settings.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// The original query text.
    pub text: String,
    /// Parsed statements (SET statements removed).
    pub statements: Vec<Statement>,
    /// Parse errors; compilation refuses while any are present.
    pub errors: Vec<ParseError>,
    /// Settings harvested from SET statements.
    pub settings: IndexMap<String, Value>,
}

/// The root catalog: named tables plus settings.
#[derive(Clone, Default)]
pub struct Context {
    tables: IndexMap<String, Table>,
    default_table: Option<String>,
    settings: IndexMap<String, Value>,
}

impl Context {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds tables, builder style.
    #[must_use]
    pub fn with_tables(mut self, tables: impl IntoIterator<Item = Table>) -> Self {
        for table in tables {
            self.add_table(table);
        }
        self
    }

    /// Selects the table used when FROM is omitted.
    #[must_use]
    pub fn with_default_table(mut self, name: impl Into<String>) -> Self {
        self.default_table = Some(name.into());
        self
    }

    /// Registers a table, replacing any table of the same name.
    pub fn add_table(&mut self, table: Table) {
        debug!(table = table.name(), "registering table");
        self.tables.insert(table.name().to_string(), table);
    }

    /// Removes a table.
    pub fn remove_table(&mut self, name: &str) -> Option<Table> {
        self.tables.shift_remove(name)
    }

    /// Looks up a table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// The default table name, if set.
    #[must_use]
    pub fn default_table(&self) -> Option<&str> {
        self.default_table.as_deref()
    }

    /// Registered table names in insertion order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// A catalog-level setting.
    #[must_use]
    pub fn setting(&self, name: &str) -> Option<&Value> {
        self.settings.get(name)
    }

    /// Sets a catalog-level setting.
    pub fn set_setting(&mut self, name: impl Into<String>, value: Value) {
        self.settings.insert(name.into(), value);
    }

    fn quoting_from(&self, settings: &IndexMap<String, Value>) -> IdentifierQuoting {
        let value = settings
            .get("identifier_quoting")
            .or_else(|| self.settings.get("identifier_quoting"));
        match value {
            Some(Value::String(s)) => {
                IdentifierQuoting::from_setting(s).unwrap_or_default()
            }
            _ => IdentifierQuoting::default(),
        }
    }

    /// Parses a statement text and harvests its `SET` settings without
    /// touching the catalog.
    #[must_use]
    pub fn prepare(&self, text: &str) -> PreparedStatement {
        debug!(len = text.len(), "preparing statement");
        let initial_quoting = self.quoting_from(&IndexMap::new());
        let script = Parser::with_options(
            text,
            ParserOptions {
                quoting: initial_quoting,
            },
        )
        .parse_script();

        let mut settings = IndexMap::new();
        for statement in &script.statements {
            if let Statement::Set { name, value } = statement {
                settings.insert(name.clone(), setting_value(value));
            }
        }

        // A harvested quoting mode changes how the text tokenizes, so the
        // statement re-parses under the new mode.
        let effective = self.quoting_from(&settings);
        let script = if effective == initial_quoting {
            script
        } else {
            Parser::with_options(text, ParserOptions { quoting: effective }).parse_script()
        };

        let statements = script
            .statements
            .into_iter()
            .filter(|s| !matches!(s, Statement::Set { .. }))
            .collect();

        PreparedStatement {
            text: text.to_string(),
            statements,
            errors: script.errors,
            settings,
        }
    }

    /// Compiles a prepared statement into a plan.
    ///
    /// Queries compile against a shallow copy of the catalog augmented with
    /// the statement's settings; DDL/DML compile against the live catalog so
    /// later statements in the block see earlier side effects.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] when the prepared statement carries parse errors,
    /// compile/programming errors per the usual rules.
    pub fn compile(
        &mut self,
        prepared: &PreparedStatement,
        parameters: &Parameters,
        options: CompileOptions,
    ) -> Result<Plan> {
        if !prepared.errors.is_empty() {
            return Err(Error::Parse(prepared.errors.clone()));
        }
        crate::compile::compile_statements(self, prepared, parameters, options)
    }

    /// Prepares, compiles and resolves in one call.
    ///
    /// # Errors
    ///
    /// Any parse, compile, programming or data error of the pipeline.
    pub fn execute(&mut self, text: &str, parameters: &Parameters) -> Result<Output> {
        let prepared = self.prepare(text);
        let plan = self.compile(&prepared, parameters, CompileOptions::default())?;
        plan.resolve()
    }

    /// `execute` with default (no) parameters.
    ///
    /// # Errors
    ///
    /// As for [`Context::execute`].
    pub fn query(&mut self, text: &str) -> Result<Output> {
        self.execute(text, &Parameters::None)
    }
}

/// Interprets a SET statement's value expression: literals stay literal, a
/// bare identifier reads as its name.
fn setting_value(expr: &peaql_parser::ast::Expr) -> Value {
    use peaql_parser::ast::{Expr, Literal};
    match expr {
        Expr::Literal(Literal::Integer(i)) => Value::Integer(*i),
        Expr::Literal(Literal::Float(f)) => Value::Real(*f),
        Expr::Literal(Literal::String(s)) => Value::String(s.clone()),
        Expr::Literal(Literal::Boolean(b)) => Value::Boolean(*b),
        Expr::Column { name, .. } => Value::String(name.clone()),
        _ => Value::Null,
    }
}

/// Builds a catalog from per-table row models: a JSON object mapping table
/// names to arrays of row objects (or `{ "data": [...] }` wrappers).
///
/// # Errors
///
/// [`Error::Programming`] when the model shape is not an object of arrays.
pub fn create_database(models: &serde_json::Value) -> Result<Context> {
    let Some(tables) = models.as_object() else {
        return Err(Error::Programming(
            "create_database expects an object of table models".into(),
        ));
    };
    let mut context = Context::new();
    for (name, model) in tables {
        let rows = model
            .get("data")
            .and_then(serde_json::Value::as_array)
            .or_else(|| model.as_array())
            .ok_or_else(|| {
                Error::Programming(format!("table model \"{name}\" has no row data"))
            })?;
        let records: Vec<Record> = rows
            .iter()
            .map(|row| {
                let mut record = Record::new();
                if let Some(fields) = row.as_object() {
                    for (field, value) in fields {
                        record.set(field.clone(), Value::from_json(value));
                    }
                }
                record
            })
            .collect();
        context.add_table(Table::from_records(name.clone(), records));
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Record {
        Record::from_pairs(pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())))
    }

    #[test]
    fn test_from_records_infers_types() {
        let table = Table::from_records(
            "t",
            vec![
                record(&[("a", Value::Null), ("b", Value::Integer(1))]),
                record(&[("a", Value::String("x".into())), ("b", Value::Integer(2))]),
            ],
        );
        assert_eq!(table.column("a").unwrap().dtype, DType::String);
        assert_eq!(table.column("b").unwrap().dtype, DType::Integer);
    }

    #[test]
    fn test_shallow_clone_shares_rows() {
        let table = Table::from_records("t", vec![record(&[("a", Value::Integer(1))])]);
        let copy = table.clone();
        table
            .storage()
            .unwrap()
            .borrow_mut()
            .push(record(&[("a", Value::Integer(2))]));
        assert_eq!(copy.rows(None).unwrap().len(), 2);
    }

    #[test]
    fn test_prepare_harvests_settings() {
        let ctx = Context::new();
        let prepared = ctx.prepare("SET identifier_quoting = backtick; SELECT 1");
        assert_eq!(
            prepared.settings.get("identifier_quoting"),
            Some(&Value::String("backtick".into()))
        );
        assert_eq!(prepared.statements.len(), 1);
        assert!(prepared.errors.is_empty());
    }

    #[test]
    fn test_resolve_type_names() {
        assert_eq!(resolve_type_name("STRING").unwrap(), DType::String);
        assert_eq!(resolve_type_name("int").unwrap(), DType::Integer);
        assert_eq!(
            resolve_type_name("integer[]").unwrap(),
            DType::List(Box::new(DType::Integer))
        );
        assert!(resolve_type_name("widget").is_err());
    }

    #[test]
    fn test_create_database() {
        let ctx = create_database(&serde_json::json!({
            "t": [{"a": 1}, {"a": 2}],
            "u": {"data": [{"b": "x"}]},
        }))
        .unwrap();
        assert!(ctx.table("t").is_some());
        assert!(ctx.table("u").is_some());
    }
}

//! Query execution: scan, filter, join, group/aggregate, window, pivot,
//! order, distinct, limit and compound queries.

use std::cmp::Ordering;
use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::registry::Accumulator;
use crate::row::Record;
use crate::value::{Key, Value};

use super::{ColumnSchema, JoinKind, JoinStep, QueryPlan, ResultSet, SetOpKind, Target};

impl QueryPlan {
    /// Executes the query, optionally under an outer row (correlated
    /// subquery bodies).
    pub(crate) fn resolve(&self, outer: Option<&Record>) -> Result<ResultSet> {
        // Subquery results cache for the duration of one execution only.
        self.invalidate_caches();
        trace!(grouped = self.grouped, "resolving query");

        let input = self.scan(outer)?;
        let filtered = self.filter(input)?;

        let mut working = if self.grouped {
            self.group(filtered)?
        } else {
            let mut rows = Vec::with_capacity(filtered.len());
            for record in filtered {
                rows.push(self.intermediate_row(record)?);
            }
            rows
        };

        if !self.windows.is_empty() {
            super::run_windows(self, &mut working)?;
        }

        if let Some((a, b)) = self.pivot {
            let pivoted = self.pivot_result(working, a, b)?;
            return Ok(self.slice_result(pivoted)?);
        }

        if self.compounds.is_empty() {
            self.sort_records(&mut working);
            if self.distinct {
                working = self.dedupe_records(working);
            }
            let working = self.apply_limit(working)?;
            let rows = working
                .iter()
                .map(|record| self.project(record))
                .collect::<Result<Vec<_>>>()?;
            Ok(ResultSet {
                columns: self.schema(),
                rows,
            })
        } else {
            let mut rows = working
                .iter()
                .map(|record| self.project(record))
                .collect::<Result<Vec<_>>>()?;
            for (op, all, arm) in &self.compounds {
                let right = arm.resolve(outer)?;
                rows = combine(rows, right.rows, *op, *all);
            }
            self.sort_rows(&mut rows);
            if self.distinct {
                rows = dedupe_rows(rows);
            }
            let rows = self.slice_rows(rows)?;
            Ok(ResultSet {
                columns: self.schema(),
                rows,
            })
        }
    }

    fn invalidate_caches(&self) {
        for target in &self.targets {
            target.node.invalidate_subqueries();
        }
        if let Some(node) = &self.where_clause {
            node.invalidate_subqueries();
        }
        if let Some(from) = &self.from {
            for step in &from.joins {
                if let Some(condition) = &step.condition {
                    condition.invalidate_subqueries();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Scan + filter
    // ------------------------------------------------------------------

    fn scan(&self, outer: Option<&Record>) -> Result<Vec<Record>> {
        let Some(from) = &self.from else {
            // No relation: a single empty row carrying the outer scopes
            // (SQL scalar-SELECT semantics).
            let mut record = Record::new();
            if let Some(outer) = outer {
                record.inherit_scopes(outer);
            }
            return Ok(vec![record]);
        };

        let mut rows = Vec::new();
        for row in from.table.rows(outer)? {
            let mut record = row.clone();
            record.add_scope(from.alias.clone(), row.as_scope());
            if let Some(outer) = outer {
                record.inherit_scopes(outer);
            }
            rows.push(record);
        }

        // The left side's column shape grows join by join; outer joins use
        // it to null-extend unmatched probe rows.
        let mut left_shape: Vec<(Option<String>, Vec<String>)> = vec![(
            None,
            from.table.columns().map(|c| c.name.clone()).collect(),
        )];
        left_shape.push((
            Some(from.alias.clone()),
            from.table.columns().map(|c| c.name.clone()).collect(),
        ));

        for step in &from.joins {
            rows = apply_join(rows, step, &left_shape, outer)?;
            left_shape.push((
                Some(step.alias.clone()),
                step.table.columns().map(|c| c.name.clone()).collect(),
            ));
        }

        Ok(rows)
    }

    fn filter(&self, input: Vec<Record>) -> Result<Vec<Record>> {
        let Some(predicate) = &self.where_clause else {
            return Ok(input);
        };
        let mut kept = Vec::with_capacity(input.len());
        for record in input {
            // NULL predicates drop the row, same as FALSE.
            if predicate.resolve(&record)?.truthy() == Some(true) {
                kept.push(record);
            }
        }
        Ok(kept)
    }

    /// Builds the intermediate row of a non-grouped query: the source
    /// record overlaid with every window-free target's value.
    fn intermediate_row(&self, record: Record) -> Result<Record> {
        let mut out = record;
        for target in &self.targets {
            if target.windows.is_empty() {
                let value = target.node.resolve(&out)?;
                out.set(target.key.clone(), value);
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Grouping
    // ------------------------------------------------------------------

    fn group(&self, input: Vec<Record>) -> Result<Vec<Record>> {
        struct Group {
            rep: Record,
            /// Key component values captured at first insert, by target
            /// index.
            keys: Vec<(usize, Value)>,
            slots: Vec<Box<dyn Accumulator>>,
        }

        let mut groups: IndexMap<Vec<Key>, Group> = IndexMap::new();

        // A grouped query with no keys aggregates everything into one
        // group, even over empty input.
        if self.group_by.is_empty() {
            groups.insert(
                Vec::new(),
                Group {
                    rep: Record::new(),
                    keys: Vec::new(),
                    slots: self
                        .aggregates
                        .iter()
                        .map(|agg| agg.make_accumulator())
                        .collect(),
                },
            );
        }

        for record in input {
            let mut key_values = Vec::with_capacity(self.group_by.len());
            for index in &self.group_by {
                key_values.push(self.targets[*index].node.resolve(&record)?);
            }
            let key: Vec<Key> = key_values.iter().map(Value::key).collect();

            if !groups.contains_key(&key) {
                groups.insert(
                    key.clone(),
                    Group {
                        rep: record.clone(),
                        keys: self.group_by.iter().copied().zip(key_values).collect(),
                        slots: self
                            .aggregates
                            .iter()
                            .map(|agg| agg.make_accumulator())
                            .collect(),
                    },
                );
            }
            let group = groups
                .get_mut(&key)
                .ok_or_else(|| Error::Internal("group vanished during aggregation".into()))?;

            for (slot, agg) in group.slots.iter_mut().zip(&self.aggregates) {
                if let Some(filter) = &agg.filter {
                    if filter.resolve(&record)?.truthy() != Some(true) {
                        continue;
                    }
                }
                if agg.star {
                    slot.update(&[]);
                } else {
                    slot.update(&agg.eval_args(&record)?);
                }
            }
        }

        let mut output = Vec::with_capacity(groups.len());
        for (_, mut group) in groups {
            // Finalize into the aggregates' result cells; mixed targets
            // re-resolve through them.
            for (slot, agg) in group.slots.iter_mut().zip(&self.aggregates) {
                *agg.value.borrow_mut() = slot.finalize();
            }

            let mut out = Record::new();
            out.inherit_scopes(&group.rep);
            for (index, target) in self.targets.iter().enumerate() {
                if !target.windows.is_empty() {
                    continue;
                }
                let value = match group.keys.iter().find(|(key_index, _)| *key_index == index) {
                    Some((_, captured)) => captured.clone(),
                    None => target.node.resolve(&group.rep)?,
                };
                out.set(target.key.clone(), value);
            }
            // Snapshot per-group aggregate values so window evaluation and
            // later re-resolution can re-install them per row.
            for (index, agg) in self.aggregates.iter().enumerate() {
                out.set(format!("@agg:{index}"), agg.value.borrow().clone());
            }

            if let Some(having) = self.having {
                let value = out
                    .get(&self.targets[having].key)
                    .cloned()
                    .unwrap_or(Value::Null);
                if value.truthy() != Some(true) {
                    continue;
                }
            }
            output.push(out);
        }

        trace!(groups = output.len(), "grouped input");
        Ok(output)
    }

    /// Re-installs a row's aggregate snapshot into the shared result cells
    /// before re-resolving target expressions for that row.
    pub(crate) fn install_aggregates(&self, record: &Record) {
        for (index, agg) in self.aggregates.iter().enumerate() {
            if let Some(value) = record.get(&format!("@agg:{index}")) {
                *agg.value.borrow_mut() = value.clone();
            }
        }
    }

    // ------------------------------------------------------------------
    // Pivot
    // ------------------------------------------------------------------

    /// Pivots the grouped result: unique `b` values become columns, rows
    /// sort by axis `a`.
    fn pivot_result(&self, working: Vec<Record>, a: usize, b: usize) -> Result<ResultSet> {
        let a_key = &self.targets[a].key;
        let b_key = &self.targets[b].key;

        let value_targets: Vec<&Target> = self
            .targets
            .iter()
            .enumerate()
            .filter(|(index, t)| t.visible && *index != a && *index != b)
            .map(|(_, t)| t)
            .collect();

        // Column axis values in first-seen order.
        let mut axis: Vec<Value> = Vec::new();
        for record in &working {
            let value = record.get(b_key).cloned().unwrap_or(Value::Null);
            if !axis.iter().any(|seen| seen.key() == value.key()) {
                axis.push(value);
            }
        }

        // Row axis values, with the cell map per (a, b) pair.
        let mut row_values: Vec<Value> = Vec::new();
        let mut cells: HashMap<(Key, Key), Vec<Value>> = HashMap::new();
        for record in &working {
            let row_value = record.get(a_key).cloned().unwrap_or(Value::Null);
            if !row_values.iter().any(|seen| seen.key() == row_value.key()) {
                row_values.push(row_value.clone());
            }
            let col_value = record.get(b_key).cloned().unwrap_or(Value::Null);
            let cell: Vec<Value> = value_targets
                .iter()
                .map(|t| record.get(&t.key).cloned().unwrap_or(Value::Null))
                .collect();
            cells.insert((row_value.key(), col_value.key()), cell);
        }

        row_values.sort_by(|x, y| x.compare(y).unwrap_or(Ordering::Equal));

        let mut columns = vec![ColumnSchema {
            name: self.targets[a].name.clone(),
            dtype: self.targets[a].node.dtype(),
        }];
        for axis_value in &axis {
            for target in &value_targets {
                let name = if value_targets.len() == 1 {
                    axis_value.to_string()
                } else {
                    format!("{axis_value} {}", target.name)
                };
                columns.push(ColumnSchema {
                    name,
                    dtype: target.node.dtype(),
                });
            }
        }

        let mut rows = Vec::with_capacity(row_values.len());
        for row_value in row_values {
            let mut row = Vec::with_capacity(columns.len());
            row.push(row_value.clone().normalized());
            for axis_value in &axis {
                match cells.get(&(row_value.key(), axis_value.key())) {
                    Some(cell) => row.extend(cell.iter().cloned().map(Value::normalized)),
                    None => row.extend(std::iter::repeat_n(Value::Null, value_targets.len())),
                }
            }
            rows.push(row);
        }

        Ok(ResultSet { columns, rows })
    }

    // ------------------------------------------------------------------
    // Order / distinct / limit / projection
    // ------------------------------------------------------------------

    fn sort_records(&self, working: &mut [Record]) {
        if self.order_by.is_empty() {
            return;
        }
        working.sort_by(|x, y| {
            for key in &self.order_by {
                let target = &self.targets[key.target];
                let a = x.get(&target.key).cloned().unwrap_or(Value::Null);
                let b = y.get(&target.key).cloned().unwrap_or(Value::Null);
                let ord = compare_for_sort(&a, &b, key.desc, key.nulls_first);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    /// Sorts projected rows (compound queries) by visible column position.
    fn sort_rows(&self, rows: &mut [Vec<Value>]) {
        if self.order_by.is_empty() {
            return;
        }
        let visible: Vec<usize> = self
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.visible)
            .map(|(index, _)| index)
            .collect();
        let positions: Vec<(usize, bool, bool)> = self
            .order_by
            .iter()
            .filter_map(|key| {
                visible
                    .iter()
                    .position(|index| *index == key.target)
                    .map(|pos| (pos, key.desc, key.nulls_first))
            })
            .collect();
        rows.sort_by(|x, y| {
            for (pos, desc, nulls_first) in &positions {
                let ord = compare_for_sort(&x[*pos], &y[*pos], *desc, *nulls_first);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    fn dedupe_records(&self, working: Vec<Record>) -> Vec<Record> {
        let mut seen: Vec<Vec<Key>> = Vec::new();
        let mut out = Vec::with_capacity(working.len());
        for record in working {
            let key: Vec<Key> = self
                .targets
                .iter()
                .filter(|t| t.visible)
                .map(|t| record.get(&t.key).cloned().unwrap_or(Value::Null).key())
                .collect();
            if !seen.contains(&key) {
                seen.push(key);
                out.push(record);
            }
        }
        out
    }

    fn limit_bounds(&self) -> Result<(Option<usize>, usize)> {
        let empty = Record::new();
        let limit = match &self.limit {
            Some(node) => node.resolve(&empty)?.as_i64().map(|n| n.max(0) as usize),
            None => None,
        };
        let offset = match &self.offset {
            Some(node) => node
                .resolve(&empty)?
                .as_i64()
                .map_or(0, |n| n.max(0) as usize),
            None => 0,
        };
        Ok((limit, offset))
    }

    fn apply_limit(&self, working: Vec<Record>) -> Result<Vec<Record>> {
        let (limit, offset) = self.limit_bounds()?;
        let mut iter = working.into_iter().skip(offset);
        Ok(match limit {
            Some(limit) => iter.by_ref().take(limit).collect(),
            None => iter.collect(),
        })
    }

    fn slice_rows(&self, rows: Vec<Vec<Value>>) -> Result<Vec<Vec<Value>>> {
        let (limit, offset) = self.limit_bounds()?;
        let mut iter = rows.into_iter().skip(offset);
        Ok(match limit {
            Some(limit) => iter.by_ref().take(limit).collect(),
            None => iter.collect(),
        })
    }

    fn slice_result(&self, result: ResultSet) -> Result<ResultSet> {
        let rows = self.slice_rows(result.rows)?;
        Ok(ResultSet {
            columns: result.columns,
            rows,
        })
    }

    /// Projects one working record onto the visible columns.
    fn project(&self, record: &Record) -> Result<Vec<Value>> {
        self.install_aggregates(record);
        let mut row = Vec::new();
        for target in &self.targets {
            if !target.visible {
                continue;
            }
            let value = record
                .get(&target.key)
                .cloned()
                .unwrap_or(Value::Null)
                .normalized();
            row.push(value);
        }
        Ok(row)
    }
}

/// Sort comparator honoring direction and null placement.
pub(crate) fn compare_for_sort(a: &Value, b: &Value, desc: bool, nulls_first: bool) -> Ordering {
    let ord = match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return if nulls_first { Ordering::Less } else { Ordering::Greater },
        (false, true) => return if nulls_first { Ordering::Greater } else { Ordering::Less },
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    };
    if desc {
        ord.reverse()
    } else {
        ord
    }
}

fn dedupe_rows(rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let mut seen: Vec<Vec<Key>> = Vec::new();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let key: Vec<Key> = row.iter().map(Value::key).collect();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(row);
        }
    }
    out
}

/// Combines compound-query row sets.
fn combine(
    left: Vec<Vec<Value>>,
    right: Vec<Vec<Value>>,
    op: SetOpKind,
    all: bool,
) -> Vec<Vec<Value>> {
    let row_key = |row: &Vec<Value>| -> Vec<Key> { row.iter().map(Value::key).collect() };
    match op {
        SetOpKind::Union => {
            let mut combined = left;
            combined.extend(right);
            if all {
                combined
            } else {
                dedupe_rows(combined)
            }
        }
        SetOpKind::Intersect => {
            let mut counts: HashMap<Vec<Key>, usize> = HashMap::new();
            for row in &right {
                *counts.entry(row_key(row)).or_insert(0) += 1;
            }
            let mut out = Vec::new();
            for row in left {
                let key = row_key(&row);
                if let Some(count) = counts.get_mut(&key) {
                    if *count > 0 {
                        if all {
                            *count -= 1;
                        }
                        out.push(row);
                    }
                }
            }
            if all {
                out
            } else {
                dedupe_rows(out)
            }
        }
        SetOpKind::Except => {
            let mut counts: HashMap<Vec<Key>, usize> = HashMap::new();
            for row in &right {
                *counts.entry(row_key(row)).or_insert(0) += 1;
            }
            let mut out = Vec::new();
            for row in left {
                let key = row_key(&row);
                match counts.get_mut(&key) {
                    Some(count) if *count > 0 => {
                        if all {
                            *count -= 1;
                        }
                        // Non-ALL EXCEPT drops every occurrence.
                    }
                    _ => out.push(row),
                }
            }
            if all {
                out
            } else {
                dedupe_rows(out)
            }
        }
    }
}

// ---------------------------------------------------------------------
// Joins
// ---------------------------------------------------------------------

/// A record whose fields are all Null, shaped like the accumulated left
/// side (or the right table) for outer-join extension.
fn null_record(shape: &[(Option<String>, Vec<String>)]) -> Record {
    let mut record = Record::new();
    for (scope, columns) in shape {
        match scope {
            None => {
                for column in columns {
                    record.set(column.clone(), Value::Null);
                }
            }
            Some(alias) => {
                let mut fragment = Record::new();
                for column in columns {
                    fragment.set(column.clone(), Value::Null);
                }
                record.add_scope(alias.clone(), fragment.as_scope());
            }
        }
    }
    record
}

fn merge_right(left: &Record, alias: &str, right: &Record) -> Record {
    let mut merged = left.clone();
    merged.add_scope(alias.to_string(), right.as_scope());
    merged
}

fn null_right(left: &Record, step: &JoinStep) -> Record {
    let mut fragment = Record::new();
    for column in step.table.columns() {
        fragment.set(column.name.clone(), Value::Null);
    }
    let mut merged = left.clone();
    merged.add_scope(step.alias.clone(), fragment.as_scope());
    merged
}

fn apply_join(
    left: Vec<Record>,
    step: &JoinStep,
    left_shape: &[(Option<String>, Vec<String>)],
    outer: Option<&Record>,
) -> Result<Vec<Record>> {
    let right_rows = step.table.rows(outer)?;
    // The right fragment is visible through the join alias only.
    let right_probe: Vec<Record> = right_rows
        .iter()
        .map(|row| {
            let mut probe = Record::new();
            probe.add_scope(step.alias.clone(), row.as_scope());
            probe
        })
        .collect();

    let mut out = Vec::new();

    if step.kind == JoinKind::Cross {
        for left_record in &left {
            for right_row in &right_rows {
                out.push(merge_right(left_record, &step.alias, right_row));
            }
        }
        return Ok(out);
    }

    // Hash path: key the right side by its join-column tuple, probe per
    // left row. Null keys never join.
    let hash_table: Option<HashMap<Vec<Key>, Vec<usize>>> = match &step.equi {
        Some((_, right_keys)) => {
            let mut table: HashMap<Vec<Key>, Vec<usize>> = HashMap::new();
            for (index, probe) in right_probe.iter().enumerate() {
                let mut key = Vec::with_capacity(right_keys.len());
                let mut has_null = false;
                for node in right_keys {
                    let value = node.resolve(probe)?;
                    if value.is_null() {
                        has_null = true;
                        break;
                    }
                    key.push(value.key());
                }
                if !has_null {
                    table.entry(key).or_default().push(index);
                }
            }
            Some(table)
        }
        None => None,
    };

    let mut right_matched = vec![false; right_rows.len()];

    for left_record in &left {
        let matches: Vec<usize> = match (&hash_table, &step.equi) {
            (Some(table), Some((left_keys, _))) => {
                let mut key = Vec::with_capacity(left_keys.len());
                let mut has_null = false;
                for node in left_keys {
                    let value = node.resolve(left_record)?;
                    if value.is_null() {
                        has_null = true;
                        break;
                    }
                    key.push(value.key());
                }
                if has_null {
                    Vec::new()
                } else {
                    table.get(&key).cloned().unwrap_or_default()
                }
            }
            _ => {
                // Nested loop with full condition evaluation.
                let mut matched = Vec::new();
                for (index, right_row) in right_rows.iter().enumerate() {
                    let candidate = merge_right(left_record, &step.alias, right_row);
                    let accept = match &step.condition {
                        Some(condition) => {
                            condition.resolve(&candidate)?.truthy() == Some(true)
                        }
                        None => true,
                    };
                    if accept {
                        matched.push(index);
                    }
                }
                matched
            }
        };

        match step.kind {
            JoinKind::Anti => {
                if matches.is_empty() {
                    out.push(left_record.clone());
                }
            }
            JoinKind::Inner | JoinKind::Cross => {
                for index in &matches {
                    right_matched[*index] = true;
                    out.push(merge_right(left_record, &step.alias, &right_rows[*index]));
                }
            }
            JoinKind::Left => {
                if matches.is_empty() {
                    out.push(null_right(left_record, step));
                } else {
                    for index in &matches {
                        right_matched[*index] = true;
                        out.push(merge_right(left_record, &step.alias, &right_rows[*index]));
                    }
                }
            }
            JoinKind::Right | JoinKind::Full => {
                for index in &matches {
                    right_matched[*index] = true;
                    out.push(merge_right(left_record, &step.alias, &right_rows[*index]));
                }
                if step.kind == JoinKind::Full && matches.is_empty() {
                    out.push(null_right(left_record, step));
                }
            }
        }
    }

    // Unmatched right rows surface null-extended for RIGHT/FULL joins.
    if matches!(step.kind, JoinKind::Right | JoinKind::Full) {
        for (index, matched) in right_matched.iter().enumerate() {
            if !matched {
                let mut record = null_record(left_shape);
                record.add_scope(step.alias.clone(), right_rows[index].as_scope());
                out.push(record);
            }
        }
    }

    Ok(out)
}

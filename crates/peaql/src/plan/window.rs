//! The window engine: partitioning, ordering, frame materialization,
//! EXCLUDE modes and per-row aggregator invocation.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::Result;
use crate::registry::WindowCtx;
use crate::row::Record;
use crate::value::{Key, Value};

use super::eval::compare_for_sort;
use super::{ExcludeMode, FrameMode, FramePlan, QueryPlan, WindowExpr};

/// Projects a sort key onto the number line for RANGE comparisons. Strings
/// map through a stable 32-bit hash (equality only; offset bounds over text
/// are rejected at compile time).
fn order_number(value: &Value) -> f64 {
    match value {
        Value::Integer(_) | Value::Real(_) | Value::Decimal(_) => {
            value.as_f64().unwrap_or(f64::NAN)
        }
        Value::DateTime(dt) => dt.timestamp_millis() as f64,
        Value::Interval(iv) => iv.total_millis() as f64,
        Value::Boolean(b) => f64::from(u8::from(*b)),
        Value::String(s) => f64::from(stable_hash(s)),
        _ => f64::NAN,
    }
}

/// FNV-1a over the string's bytes, folded to 32 bits: stable per string and
/// per process.
fn stable_hash(text: &str) -> i32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in text.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash as i32
}

fn keys_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.key() == y.key())
}

/// Frame member positions before EXCLUDE, per the frame mode.
fn frame_positions(
    frame: FramePlan,
    pos: usize,
    len: usize,
    order_tuples: &[Vec<Value>],
    order_numbers: &[f64],
    descending: bool,
) -> Vec<usize> {
    match frame.mode {
        FrameMode::Rows => {
            let start = if frame.preceding.is_infinite() {
                0
            } else {
                pos.saturating_sub(frame.preceding as usize)
            };
            let end = if frame.following.is_infinite() {
                len.saturating_sub(1)
            } else {
                (pos + frame.following as usize).min(len.saturating_sub(1))
            };
            if len == 0 || start > end {
                Vec::new()
            } else {
                (start..=end).collect()
            }
        }
        FrameMode::Groups => {
            // Bucket the sorted partition by order-key equality.
            let mut buckets = Vec::with_capacity(len);
            let mut bucket = 0usize;
            for i in 0..len {
                if i > 0 && !keys_equal(&order_tuples[i], &order_tuples[i - 1]) {
                    bucket += 1;
                }
                buckets.push(bucket);
            }
            let current = buckets.get(pos).copied().unwrap_or(0);
            let lo = if frame.preceding.is_infinite() {
                0
            } else {
                current.saturating_sub(frame.preceding as usize)
            };
            let hi = if frame.following.is_infinite() {
                usize::MAX
            } else {
                current + frame.following as usize
            };
            (0..len).filter(|i| buckets[*i] >= lo && buckets[*i] <= hi).collect()
        }
        FrameMode::Range => {
            let reference = order_numbers.get(pos).copied().unwrap_or(f64::NAN);
            (0..len)
                .filter(|i| {
                    let x = order_numbers[*i];
                    if reference.is_nan() || x.is_nan() {
                        // Nulls are peers of each other only.
                        return reference.is_nan() && x.is_nan();
                    }
                    if descending {
                        let lower_ok =
                            frame.following.is_infinite() || x >= reference - frame.following;
                        let upper_ok =
                            frame.preceding.is_infinite() || x <= reference + frame.preceding;
                        lower_ok && upper_ok
                    } else {
                        let lower_ok =
                            frame.preceding.is_infinite() || x >= reference - frame.preceding;
                        let upper_ok =
                            frame.following.is_infinite() || x <= reference + frame.following;
                        lower_ok && upper_ok
                    }
                })
                .collect()
        }
    }
}

/// Applies the EXCLUDE mode to a materialized frame.
fn apply_exclude(
    positions: Vec<usize>,
    exclude: ExcludeMode,
    pos: usize,
    order_tuples: &[Vec<Value>],
    has_order: bool,
) -> Vec<usize> {
    match exclude {
        ExcludeMode::None => positions,
        ExcludeMode::Current => positions.into_iter().filter(|i| *i != pos).collect(),
        ExcludeMode::Group => {
            // Without ORDER BY every row is a peer, so the window empties.
            if !has_order {
                return Vec::new();
            }
            positions
                .into_iter()
                .filter(|i| !keys_equal(&order_tuples[*i], &order_tuples[pos]))
                .collect()
        }
        ExcludeMode::Ties => {
            if !has_order {
                return positions.into_iter().filter(|i| *i == pos).collect();
            }
            positions
                .into_iter()
                .filter(|i| *i == pos || !keys_equal(&order_tuples[*i], &order_tuples[pos]))
                .collect()
        }
    }
}

/// Runs every window of the plan over the intermediate rows and writes the
/// window-bearing targets back.
pub(crate) fn run_windows(plan: &QueryPlan, rows: &mut [Record]) -> Result<()> {
    let n = rows.len();
    let mut results: Vec<Vec<Value>> = Vec::with_capacity(plan.windows.len());

    for window in &plan.windows {
        results.push(run_one_window(plan, window, rows)?);
    }

    for target in &plan.targets {
        if target.windows.is_empty() {
            continue;
        }
        for i in 0..n {
            plan.install_aggregates(&rows[i]);
            for window in &target.windows {
                let slot = plan
                    .windows
                    .iter()
                    .position(|w| Rc::ptr_eq(w, window))
                    .unwrap_or_default();
                *window.value.borrow_mut() = results[slot][i].clone();
            }
            let value = target.node.resolve(&rows[i])?;
            rows[i].set(target.key.clone(), value);
        }
    }

    Ok(())
}

fn run_one_window(
    plan: &QueryPlan,
    window: &Rc<WindowExpr>,
    rows: &[Record],
) -> Result<Vec<Value>> {
    let n = rows.len();
    let frame = window.frame.get();
    let partition_keys = window.partition.borrow();
    let order_keys = window.order.borrow();
    let descending = order_keys.first().is_some_and(|key| key.desc);

    // Partition in first-seen order.
    let mut partitions: IndexMap<Vec<Key>, Vec<usize>> = IndexMap::new();
    for i in 0..n {
        let key: Vec<Key> = partition_keys
            .iter()
            .map(|t| {
                rows[i]
                    .get(&plan.targets[*t].key)
                    .cloned()
                    .unwrap_or(Value::Null)
                    .key()
            })
            .collect();
        partitions.entry(key).or_default().push(i);
    }

    let mut out = vec![Value::Null; n];

    for (_, mut part) in partitions {
        part.sort_by(|&x, &y| {
            for key in order_keys.iter() {
                let target_key = &plan.targets[key.target].key;
                let a = rows[x].get(target_key).cloned().unwrap_or(Value::Null);
                let b = rows[y].get(target_key).cloned().unwrap_or(Value::Null);
                let ord = compare_for_sort(&a, &b, key.desc, key.desc);
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });

        let len = part.len();
        let mut order_tuples: Vec<Vec<Value>> = Vec::with_capacity(len);
        let mut args: Vec<Vec<Value>> = Vec::with_capacity(len);
        for &row_index in &part {
            let record = &rows[row_index];
            plan.install_aggregates(record);
            order_tuples.push(
                order_keys
                    .iter()
                    .map(|key| {
                        record
                            .get(&plan.targets[key.target].key)
                            .cloned()
                            .unwrap_or(Value::Null)
                    })
                    .collect(),
            );
            if window.agg.star {
                args.push(Vec::new());
            } else {
                args.push(window.agg.eval_args(record)?);
            }
        }
        let order_numbers: Vec<f64> = order_tuples
            .iter()
            .map(|tuple| tuple.first().map_or(f64::NAN, order_number))
            .collect();

        let args_rc = Rc::new(args);
        let keys_rc = Rc::new(order_tuples);

        for (pos, &row_index) in part.iter().enumerate() {
            let members = frame_positions(frame, pos, len, &keys_rc, &order_numbers, descending);
            let members = apply_exclude(members, frame.exclude, pos, &keys_rc, !order_keys.is_empty());

            let mut accumulator = window.agg.make_accumulator();
            for &member in &members {
                if let Some(filter) = &window.agg.filter {
                    plan.install_aggregates(&rows[part[member]]);
                    if filter.resolve(&rows[part[member]])?.truthy() != Some(true) {
                        continue;
                    }
                }
                accumulator.update(&args_rc[member]);
            }
            accumulator.set_window(&WindowCtx {
                index: pos,
                frame: members,
                args: Rc::clone(&args_rc),
                order_keys: Rc::clone(&keys_rc),
                size: len,
            });
            out[row_index] = accumulator.finalize();
        }
    }

    Ok(out)
}

//! Aggregators and window-only functions.
//!
//! Aggregator state lives in per-group slot vectors owned by the evaluator;
//! each aggregate's handle is its index into the slot vector. Window-only
//! functions receive a [`WindowCtx`] injection before finalize.

use std::cmp::Ordering;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::registry::{Accumulator, AggregateDef, Registry, WindowCtx};
use crate::types::DType;
use crate::value::{Key, Value};

fn arg_type(args: &[DType]) -> DType {
    args.first().cloned().unwrap_or(DType::Object)
}

fn ret_integer(_: &[DType]) -> DType {
    DType::Integer
}

fn ret_decimal(_: &[DType]) -> DType {
    DType::Decimal
}

fn ret_string(_: &[DType]) -> DType {
    DType::String
}

fn ret_arg(args: &[DType]) -> DType {
    arg_type(args)
}

fn ret_list(args: &[DType]) -> DType {
    DType::List(Box::new(arg_type(args)))
}

fn ret_sum(args: &[DType]) -> DType {
    match arg_type(args) {
        DType::Integer => DType::Integer,
        DType::Real => DType::Real,
        DType::Decimal => DType::Decimal,
        DType::Interval => DType::Interval,
        _ => DType::Object,
    }
}

// ---------------------------------------------------------------------
// Plain aggregators
// ---------------------------------------------------------------------

/// `count(*)` counts rows (no arguments); `count(x)` counts non-null `x`.
#[derive(Default)]
struct Count {
    n: i64,
}

impl Accumulator for Count {
    fn update(&mut self, args: &[Value]) {
        if args.is_empty() || !args[0].is_null() {
            self.n += 1;
        }
    }

    fn finalize(&mut self) -> Value {
        Value::Integer(self.n)
    }
}

/// Sum keeps the input's numeric flavor; Null on empty input.
#[derive(Default)]
struct Sum {
    acc: Option<Value>,
}

impl Accumulator for Sum {
    fn update(&mut self, args: &[Value]) {
        let value = &args[0];
        if value.is_null() {
            return;
        }
        self.acc = Some(match (&self.acc, value) {
            (None, v) => v.clone(),
            (Some(Value::Integer(a)), Value::Integer(b)) => match a.checked_add(*b) {
                Some(sum) => Value::Integer(sum),
                // Overflow promotes to decimal accumulation.
                None => Value::Decimal(Decimal::from(*a) + Decimal::from(*b)),
            },
            (Some(Value::Real(a)), b) => Value::Real(a + b.as_f64().unwrap_or(0.0)),
            (Some(a), Value::Real(b)) => Value::Real(a.as_f64().unwrap_or(0.0) + b),
            (Some(a), b) => {
                let a = a.as_decimal().unwrap_or_default();
                let b = b.as_decimal().unwrap_or_default();
                Value::Decimal(a + b)
            }
        });
    }

    fn finalize(&mut self) -> Value {
        self.acc.clone().unwrap_or(Value::Null)
    }
}

/// Decimal-accumulating average; Null on empty input.
#[derive(Default)]
struct Avg {
    sum: Decimal,
    n: i64,
}

impl Accumulator for Avg {
    fn update(&mut self, args: &[Value]) {
        let value = &args[0];
        if value.is_null() {
            return;
        }
        let as_decimal = value
            .as_decimal()
            .or_else(|| value.as_f64().and_then(Decimal::from_f64));
        if let Some(d) = as_decimal {
            self.sum += d;
            self.n += 1;
        }
    }

    fn finalize(&mut self) -> Value {
        if self.n == 0 {
            return Value::Null;
        }
        self.sum
            .checked_div(Decimal::from(self.n))
            .map_or(Value::Null, Value::Decimal)
    }
}

struct Extreme {
    best: Option<Value>,
    keep: Ordering,
}

impl Extreme {
    fn min() -> Self {
        Self {
            best: None,
            keep: Ordering::Less,
        }
    }

    fn max() -> Self {
        Self {
            best: None,
            keep: Ordering::Greater,
        }
    }
}

impl Accumulator for Extreme {
    fn update(&mut self, args: &[Value]) {
        let value = &args[0];
        if value.is_null() {
            return;
        }
        match &self.best {
            None => self.best = Some(value.clone()),
            Some(best) => {
                if value.compare(best) == Some(self.keep) {
                    self.best = Some(value.clone());
                }
            }
        }
    }

    fn finalize(&mut self) -> Value {
        self.best.clone().unwrap_or(Value::Null)
    }
}

/// `first`/`last` keep the first/latest value seen, nulls included.
struct Edge {
    value: Option<Value>,
    last: bool,
}

impl Accumulator for Edge {
    fn update(&mut self, args: &[Value]) {
        if self.last || self.value.is_none() {
            self.value = Some(args[0].clone());
        }
    }

    fn finalize(&mut self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }
}

/// `group_concat(x, sep)`; the separator defaults to `,`.
#[derive(Default)]
struct GroupConcat {
    parts: Vec<String>,
    separator: Option<String>,
}

impl Accumulator for GroupConcat {
    fn update(&mut self, args: &[Value]) {
        if let Some(Value::String(sep)) = args.get(1) {
            self.separator = Some(sep.clone());
        }
        if !args[0].is_null() {
            self.parts.push(args[0].to_string());
        }
    }

    fn finalize(&mut self) -> Value {
        if self.parts.is_empty() {
            return Value::Null;
        }
        let sep = self.separator.as_deref().unwrap_or(",");
        Value::String(self.parts.join(sep))
    }
}

#[derive(Default)]
struct ArrayAgg {
    items: Vec<Value>,
}

impl Accumulator for ArrayAgg {
    fn update(&mut self, args: &[Value]) {
        self.items.push(args[0].clone());
    }

    fn finalize(&mut self) -> Value {
        Value::List(self.items.clone())
    }
}

/// The DISTINCT wrapper: materializes argument tuples, dedupes at finalize
/// time, then replays into the wrapped accumulator.
///
/// NULL is excluded from the distinct set (strict SQL).
pub(crate) struct Distinct {
    inner: Box<dyn Accumulator>,
    seen: Vec<(Vec<Key>, Vec<Value>)>,
}

impl Distinct {
    pub(crate) fn new(inner: Box<dyn Accumulator>) -> Self {
        Self {
            inner,
            seen: Vec::new(),
        }
    }
}

impl Accumulator for Distinct {
    fn update(&mut self, args: &[Value]) {
        if args.first().is_some_and(Value::is_null) {
            return;
        }
        let key: Vec<Key> = args.iter().map(Value::key).collect();
        if !self.seen.iter().any(|(seen, _)| *seen == key) {
            self.seen.push((key, args.to_vec()));
        }
    }

    fn finalize(&mut self) -> Value {
        for (_, args) in &self.seen {
            self.inner.update(args);
        }
        self.inner.finalize()
    }

    fn set_window(&mut self, ctx: &WindowCtx) {
        self.inner.set_window(ctx);
    }
}

// ---------------------------------------------------------------------
// Window-only functions
// ---------------------------------------------------------------------

#[derive(Default)]
struct RowNumber {
    ctx: Option<WindowCtx>,
}

impl Accumulator for RowNumber {
    fn update(&mut self, _: &[Value]) {}

    fn finalize(&mut self) -> Value {
        self.ctx
            .as_ref()
            .map_or(Value::Null, |ctx| Value::Integer(ctx.index as i64 + 1))
    }

    fn set_window(&mut self, ctx: &WindowCtx) {
        self.ctx = Some(ctx.clone());
    }
}

/// Index of the first peer of row `index` (rows sharing its order key).
fn first_peer(ctx: &WindowCtx) -> usize {
    let mine = &ctx.order_keys[ctx.index];
    (0..=ctx.index)
        .find(|i| keys_equal(&ctx.order_keys[*i], mine))
        .unwrap_or(ctx.index)
}

fn keys_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key() == y.key())
}

struct Rank {
    dense: bool,
    ctx: Option<WindowCtx>,
}

impl Accumulator for Rank {
    fn update(&mut self, _: &[Value]) {}

    fn finalize(&mut self) -> Value {
        let Some(ctx) = &self.ctx else {
            return Value::Null;
        };
        let peer = first_peer(ctx);
        if !self.dense {
            return Value::Integer(peer as i64 + 1);
        }
        let mut distinct = 0i64;
        let mut previous: Option<&Vec<Value>> = None;
        for keys in ctx.order_keys.iter().take(peer) {
            if previous.is_none_or(|prev| !keys_equal(prev, keys)) {
                distinct += 1;
            }
            previous = Some(keys);
        }
        Value::Integer(distinct + 1)
    }

    fn set_window(&mut self, ctx: &WindowCtx) {
        self.ctx = Some(ctx.clone());
    }
}

/// first_value / last_value / nth_value over the frame.
struct NthValue {
    /// 1-based position in the frame; `None` means last.
    position: Option<i64>,
    ctx: Option<WindowCtx>,
}

impl Accumulator for NthValue {
    fn update(&mut self, _: &[Value]) {}

    fn finalize(&mut self) -> Value {
        let Some(ctx) = &self.ctx else {
            return Value::Null;
        };
        let position = match self.position {
            Some(n) => n,
            // nth_value(x, n): n arrives as the current row's second arg.
            None => match ctx.args[ctx.index].get(1).and_then(Value::as_i64) {
                Some(n) => n,
                None => return Value::Null,
            },
        };
        let slot = if position < 0 {
            ctx.frame.len() as i64 + position
        } else {
            position - 1
        };
        if slot < 0 {
            return Value::Null;
        }
        ctx.frame
            .get(slot as usize)
            .and_then(|row| ctx.args[*row].first())
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn set_window(&mut self, ctx: &WindowCtx) {
        self.ctx = Some(ctx.clone());
    }
}

/// lead/lag relative to the current row within the partition.
struct Shift {
    back: bool,
    ctx: Option<WindowCtx>,
}

impl Accumulator for Shift {
    fn update(&mut self, _: &[Value]) {}

    fn finalize(&mut self) -> Value {
        let Some(ctx) = &self.ctx else {
            return Value::Null;
        };
        let mine = &ctx.args[ctx.index];
        let offset = mine.get(1).and_then(Value::as_i64).unwrap_or(1);
        let default = mine.get(2).cloned().unwrap_or(Value::Null);
        let target = if self.back {
            ctx.index as i64 - offset
        } else {
            ctx.index as i64 + offset
        };
        if target < 0 || target >= ctx.size as i64 {
            return default;
        }
        ctx.args[target as usize].first().cloned().unwrap_or(Value::Null)
    }

    fn set_window(&mut self, ctx: &WindowCtx) {
        self.ctx = Some(ctx.clone());
    }
}

// ---------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------

fn aggregate(
    reg: &mut Registry,
    name: &'static str,
    params: Vec<DType>,
    ret: fn(&[DType]) -> DType,
    factory: fn() -> Box<dyn Accumulator>,
) {
    reg.add_aggregate(AggregateDef {
        name,
        params,
        ret,
        factory,
        window_only: false,
    });
}

fn window_fn(
    reg: &mut Registry,
    name: &'static str,
    params: Vec<DType>,
    ret: fn(&[DType]) -> DType,
    factory: fn() -> Box<dyn Accumulator>,
) {
    reg.add_aggregate(AggregateDef {
        name,
        params,
        ret,
        factory,
        window_only: true,
    });
}

pub(super) fn install(reg: &mut Registry) {
    let any = || DType::Object;
    aggregate(reg, "count", vec![any()], ret_integer, || Box::new(Count::default()));
    aggregate(reg, "sum", vec![any()], ret_sum, || Box::new(Sum::default()));
    aggregate(reg, "avg", vec![any()], ret_decimal, || Box::new(Avg::default()));
    aggregate(reg, "min", vec![any()], ret_arg, || Box::new(Extreme::min()));
    aggregate(reg, "max", vec![any()], ret_arg, || Box::new(Extreme::max()));
    aggregate(reg, "first", vec![any()], ret_arg, || {
        Box::new(Edge {
            value: None,
            last: false,
        })
    });
    aggregate(reg, "last", vec![any()], ret_arg, || {
        Box::new(Edge {
            value: None,
            last: true,
        })
    });
    aggregate(
        reg,
        "group_concat",
        vec![any(), DType::Vararg(Box::new(DType::String))],
        ret_string,
        || Box::new(GroupConcat::default()),
    );
    aggregate(reg, "array_agg", vec![any()], ret_list, || {
        Box::new(ArrayAgg::default())
    });

    window_fn(reg, "row_number", vec![], ret_integer, || {
        Box::new(RowNumber::default())
    });
    window_fn(reg, "rank", vec![], ret_integer, || {
        Box::new(Rank {
            dense: false,
            ctx: None,
        })
    });
    window_fn(reg, "dense_rank", vec![], ret_integer, || {
        Box::new(Rank {
            dense: true,
            ctx: None,
        })
    });
    window_fn(reg, "first_value", vec![any()], ret_arg, || {
        Box::new(NthValue {
            position: Some(1),
            ctx: None,
        })
    });
    window_fn(reg, "last_value", vec![any()], ret_arg, || {
        Box::new(NthValue {
            position: Some(-1),
            ctx: None,
        })
    });
    window_fn(
        reg,
        "nth_value",
        vec![any(), DType::Integer],
        ret_arg,
        || {
            Box::new(NthValue {
                position: None,
                ctx: None,
            })
        },
    );
    window_fn(
        reg,
        "lead",
        vec![any(), DType::Vararg(Box::new(DType::Object))],
        ret_arg,
        || {
            Box::new(Shift {
                back: false,
                ctx: None,
            })
        },
    );
    window_fn(
        reg,
        "lag",
        vec![any(), DType::Vararg(Box::new(DType::Object))],
        ret_arg,
        || {
            Box::new(Shift {
                back: true,
                ctx: None,
            })
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(acc: &mut dyn Accumulator, values: &[Value]) {
        for value in values {
            acc.update(std::slice::from_ref(value));
        }
    }

    #[test]
    fn test_count_star_vs_column() {
        let mut star = Count::default();
        star.update(&[]);
        star.update(&[]);
        assert_eq!(star.finalize(), Value::Integer(2));

        let mut column = Count::default();
        feed(&mut column, &[Value::Integer(1), Value::Null, Value::Integer(2)]);
        assert_eq!(column.finalize(), Value::Integer(2));
    }

    #[test]
    fn test_sum_empty_is_null() {
        let mut sum = Sum::default();
        assert_eq!(sum.finalize(), Value::Null);
        feed(&mut sum, &[Value::Integer(1), Value::Integer(2), Value::Null]);
        assert_eq!(sum.finalize(), Value::Integer(3));
    }

    #[test]
    fn test_sum_keeps_real_flavor() {
        let mut sum = Sum::default();
        feed(&mut sum, &[Value::Integer(1), Value::Real(0.5)]);
        assert_eq!(sum.finalize(), Value::Real(1.5));
    }

    #[test]
    fn test_avg_is_decimal() {
        let mut avg = Avg::default();
        feed(&mut avg, &[Value::Integer(1), Value::Integer(2)]);
        assert_eq!(avg.finalize(), Value::Decimal("1.5".parse().unwrap()));
        let mut empty = Avg::default();
        assert_eq!(empty.finalize(), Value::Null);
    }

    #[test]
    fn test_min_max_skip_nulls() {
        let mut min = Extreme::min();
        feed(&mut min, &[Value::Null, Value::Integer(4), Value::Integer(2)]);
        assert_eq!(min.finalize(), Value::Integer(2));
        let mut max = Extreme::max();
        feed(&mut max, &[Value::Integer(4), Value::Null, Value::Integer(9)]);
        assert_eq!(max.finalize(), Value::Integer(9));
    }

    #[test]
    fn test_group_concat() {
        let mut gc = GroupConcat::default();
        gc.update(&[Value::String("A".into()), Value::String(".".into())]);
        gc.update(&[Value::String("D".into()), Value::String(".".into())]);
        gc.update(&[Value::Null, Value::String(".".into())]);
        assert_eq!(gc.finalize(), Value::String("A.D".into()));
    }

    #[test]
    fn test_distinct_wrapper_excludes_null() {
        let mut distinct = Distinct::new(Box::new(Count::default()));
        for v in [
            Value::String("A".into()),
            Value::String("B".into()),
            Value::String("A".into()),
            Value::Null,
            Value::String("C".into()),
        ] {
            distinct.update(&[v]);
        }
        assert_eq!(distinct.finalize(), Value::Integer(3));
    }

    #[test]
    fn test_distinct_collapses_numeric_duplicates() {
        let mut distinct = Distinct::new(Box::new(Count::default()));
        distinct.update(&[Value::Integer(1)]);
        distinct.update(&[Value::Real(1.0)]);
        distinct.update(&[Value::Integer(2)]);
        assert_eq!(distinct.finalize(), Value::Integer(2));
    }

    fn window_ctx(order: &[i64]) -> WindowCtx {
        WindowCtx {
            index: 0,
            frame: (0..order.len()).collect(),
            args: std::rc::Rc::new(order.iter().map(|v| vec![Value::Integer(*v)]).collect()),
            order_keys: std::rc::Rc::new(order.iter().map(|v| vec![Value::Integer(*v)]).collect()),
            size: order.len(),
        }
    }

    #[test]
    fn test_rank_with_ties() {
        // order values 10, 20, 20, 30 → ranks 1, 2, 2, 4; dense 1, 2, 2, 3.
        let base = window_ctx(&[10, 20, 20, 30]);
        let expect = [(0, 1, 1), (1, 2, 2), (2, 2, 2), (3, 4, 3)];
        for (index, rank, dense) in expect {
            let ctx = WindowCtx {
                index,
                ..base.clone()
            };
            let mut plain = Rank {
                dense: false,
                ctx: None,
            };
            plain.set_window(&ctx);
            assert_eq!(plain.finalize(), Value::Integer(rank));
            let mut dense_rank = Rank {
                dense: true,
                ctx: None,
            };
            dense_rank.set_window(&ctx);
            assert_eq!(dense_rank.finalize(), Value::Integer(dense));
        }
    }

    #[test]
    fn test_lead_lag() {
        let base = window_ctx(&[10, 20, 30]);
        let ctx = WindowCtx {
            index: 1,
            ..base.clone()
        };
        let mut lead = Shift {
            back: false,
            ctx: None,
        };
        lead.set_window(&ctx);
        assert_eq!(lead.finalize(), Value::Integer(30));
        let mut lag = Shift {
            back: true,
            ctx: None,
        };
        lag.set_window(&ctx);
        assert_eq!(lag.finalize(), Value::Integer(10));

        // Off the partition edge falls back to the default (Null here).
        let edge = WindowCtx {
            index: 2,
            ..base
        };
        let mut lead = Shift {
            back: false,
            ctx: None,
        };
        lead.set_window(&edge);
        assert_eq!(lead.finalize(), Value::Null);
    }
}

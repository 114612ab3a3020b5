//! Arithmetic, comparison, cast and numeric built-ins.

use std::cmp::Ordering;

use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::registry::{FunctionDef, Registry, ScalarFn, Signature};
use crate::types::DType;
use crate::value::{datetime_from_millis, parse_datetime, Interval, Value};

pub(super) fn sig(params: &[DType], ret: DType, eval: ScalarFn) -> Signature {
    Signature {
        params: params.to_vec(),
        ret,
        null_safe: false,
        eval,
    }
}

pub(super) fn null_safe_sig(params: &[DType], ret: DType, eval: ScalarFn) -> Signature {
    Signature {
        params: params.to_vec(),
        ret,
        null_safe: true,
        eval,
    }
}

pub(super) fn function(
    reg: &mut Registry,
    name: &'static str,
    pure: bool,
    signatures: Vec<Signature>,
) {
    reg.add_function(FunctionDef {
        name,
        pure,
        signatures,
    });
}

// ---------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------

fn int_pair(args: &[Value]) -> Option<(i64, i64)> {
    match (&args[0], &args[1]) {
        (Value::Integer(a), Value::Integer(b)) => Some((*a, *b)),
        _ => None,
    }
}

fn real_pair(args: &[Value]) -> Option<(f64, f64)> {
    Some((args[0].as_f64()?, args[1].as_f64()?))
}

fn decimal_pair(args: &[Value]) -> Option<(Decimal, Decimal)> {
    Some((args[0].as_decimal()?, args[1].as_decimal()?))
}

fn add_int(args: &[Value]) -> Value {
    int_pair(args)
        .and_then(|(a, b)| a.checked_add(b))
        .map_or(Value::Null, Value::Integer)
}

fn add_real(args: &[Value]) -> Value {
    real_pair(args).map_or(Value::Null, |(a, b)| Value::Real(a + b))
}

fn add_decimal(args: &[Value]) -> Value {
    decimal_pair(args)
        .and_then(|(a, b)| a.checked_add(b))
        .map_or(Value::Null, Value::Decimal)
}

fn sub_int(args: &[Value]) -> Value {
    int_pair(args)
        .and_then(|(a, b)| a.checked_sub(b))
        .map_or(Value::Null, Value::Integer)
}

fn sub_real(args: &[Value]) -> Value {
    real_pair(args).map_or(Value::Null, |(a, b)| Value::Real(a - b))
}

fn sub_decimal(args: &[Value]) -> Value {
    decimal_pair(args)
        .and_then(|(a, b)| a.checked_sub(b))
        .map_or(Value::Null, Value::Decimal)
}

fn mul_int(args: &[Value]) -> Value {
    int_pair(args)
        .and_then(|(a, b)| a.checked_mul(b))
        .map_or(Value::Null, Value::Integer)
}

fn mul_real(args: &[Value]) -> Value {
    real_pair(args).map_or(Value::Null, |(a, b)| Value::Real(a * b))
}

fn mul_decimal(args: &[Value]) -> Value {
    decimal_pair(args)
        .and_then(|(a, b)| a.checked_mul(b))
        .map_or(Value::Null, Value::Decimal)
}

/// Integer division truncates toward zero; division by zero is Null.
fn div_int(args: &[Value]) -> Value {
    int_pair(args)
        .and_then(|(a, b)| if b == 0 { None } else { a.checked_div(b) })
        .map_or(Value::Null, Value::Integer)
}

fn div_real(args: &[Value]) -> Value {
    real_pair(args).map_or(Value::Null, |(a, b)| {
        if b == 0.0 {
            Value::Null
        } else {
            Value::Real(a / b)
        }
    })
}

fn div_decimal(args: &[Value]) -> Value {
    decimal_pair(args)
        .and_then(|(a, b)| a.checked_div(b))
        .map_or(Value::Null, Value::Decimal)
}

fn mod_int(args: &[Value]) -> Value {
    int_pair(args)
        .and_then(|(a, b)| if b == 0 { None } else { a.checked_rem(b) })
        .map_or(Value::Null, Value::Integer)
}

fn mod_real(args: &[Value]) -> Value {
    real_pair(args).map_or(Value::Null, |(a, b)| {
        if b == 0.0 {
            Value::Null
        } else {
            Value::Real(a % b)
        }
    })
}

/// Decimal `%` truncates toward zero, matching the integer convention.
fn mod_decimal(args: &[Value]) -> Value {
    decimal_pair(args)
        .and_then(|(a, b)| a.checked_rem(b))
        .map_or(Value::Null, Value::Decimal)
}

/// `+` over (Number, String) and (String, _) concatenates.
fn add_concat(args: &[Value]) -> Value {
    Value::String(format!("{}{}", args[0], args[1]))
}

/// `+`/`-` between DateTime and Number treats the number as days.
fn datetime_add_days(args: &[Value]) -> Value {
    let (dt, days) = match (&args[0], &args[1]) {
        (Value::DateTime(dt), days) => (dt, days),
        (days, Value::DateTime(dt)) => (dt, days),
        _ => return Value::Null,
    };
    let Some(days) = days.as_f64() else {
        return Value::Null;
    };
    let millis = (days * 86_400_000.0) as i64;
    Value::DateTime(*dt + Duration::milliseconds(millis))
}

fn datetime_sub_days(args: &[Value]) -> Value {
    let (Value::DateTime(dt), days) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    let Some(days) = days.as_f64() else {
        return Value::Null;
    };
    let millis = (days * 86_400_000.0) as i64;
    Value::DateTime(*dt - Duration::milliseconds(millis))
}

fn datetime_add_interval(args: &[Value]) -> Value {
    let (dt, iv) = match (&args[0], &args[1]) {
        (Value::DateTime(dt), Value::Interval(iv)) => (*dt, *iv),
        (Value::Interval(iv), Value::DateTime(dt)) => (*dt, *iv),
        _ => return Value::Null,
    };
    super::temporal::shift_datetime(dt, &iv).map_or(Value::Null, Value::DateTime)
}

fn datetime_sub_interval(args: &[Value]) -> Value {
    let (Value::DateTime(dt), Value::Interval(iv)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    super::temporal::shift_datetime(*dt, &iv.negate()).map_or(Value::Null, Value::DateTime)
}

fn interval_add(args: &[Value]) -> Value {
    let (Value::Interval(a), Value::Interval(b)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    Value::Interval(a.add(b))
}

fn interval_sub(args: &[Value]) -> Value {
    let (Value::Interval(a), Value::Interval(b)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    Value::Interval(a.add(&b.negate()))
}

fn neg(args: &[Value]) -> Value {
    match &args[0] {
        Value::Integer(i) => i.checked_neg().map_or(Value::Null, Value::Integer),
        Value::Real(f) => Value::Real(-f),
        Value::Decimal(d) => Value::Decimal(-d),
        Value::Interval(iv) => Value::Interval(iv.negate()),
        _ => Value::Null,
    }
}

// ---------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------

fn bool_or_null(result: Option<bool>) -> Value {
    result.map_or(Value::Null, Value::Boolean)
}

fn cmp_eq(args: &[Value]) -> Value {
    bool_or_null(args[0].compare(&args[1]).map(|o| o == Ordering::Equal))
}

fn cmp_ne(args: &[Value]) -> Value {
    bool_or_null(args[0].compare(&args[1]).map(|o| o != Ordering::Equal))
}

fn cmp_lt(args: &[Value]) -> Value {
    bool_or_null(args[0].compare(&args[1]).map(|o| o == Ordering::Less))
}

fn cmp_le(args: &[Value]) -> Value {
    bool_or_null(args[0].compare(&args[1]).map(|o| o != Ordering::Greater))
}

fn cmp_gt(args: &[Value]) -> Value {
    bool_or_null(args[0].compare(&args[1]).map(|o| o == Ordering::Greater))
}

fn cmp_ge(args: &[Value]) -> Value {
    bool_or_null(args[0].compare(&args[1]).map(|o| o != Ordering::Less))
}

// ---------------------------------------------------------------------
// Casts
// ---------------------------------------------------------------------

pub(super) fn cast_integer(args: &[Value]) -> Value {
    match &args[0] {
        Value::Integer(i) => Value::Integer(*i),
        Value::Real(f) if f.is_finite() => Value::Integer(f.trunc() as i64),
        Value::Decimal(d) => d.trunc().to_i64().map_or(Value::Null, Value::Integer),
        Value::Boolean(b) => Value::Integer(i64::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().map_or_else(
                |_| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map_or(Value::Null, |f| Value::Integer(f.trunc() as i64))
                },
                Value::Integer,
            )
        }
        Value::DateTime(dt) => Value::Integer(dt.timestamp_millis()),
        _ => Value::Null,
    }
}

pub(super) fn cast_real(args: &[Value]) -> Value {
    match &args[0] {
        Value::Boolean(b) => Value::Real(f64::from(u8::from(*b))),
        Value::String(s) => s.trim().parse::<f64>().map_or(Value::Null, Value::Real),
        Value::DateTime(dt) => Value::Real(dt.timestamp_millis() as f64),
        other => other.as_f64().map_or(Value::Null, Value::Real),
    }
}

pub(super) fn cast_decimal(args: &[Value]) -> Value {
    match &args[0] {
        Value::String(s) => s.trim().parse::<Decimal>().map_or(Value::Null, Value::Decimal),
        Value::Boolean(b) => Value::Decimal(Decimal::from(u8::from(*b))),
        other => other.as_decimal().map_or(Value::Null, Value::Decimal),
    }
}

pub(super) fn cast_string(args: &[Value]) -> Value {
    match &args[0] {
        Value::Null => Value::Null,
        other => Value::String(other.to_string()),
    }
}

pub(super) fn cast_boolean(args: &[Value]) -> Value {
    match &args[0] {
        Value::Boolean(b) => Value::Boolean(*b),
        Value::Integer(_) | Value::Real(_) | Value::Decimal(_) => {
            args[0].truthy().map_or(Value::Null, Value::Boolean)
        }
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Value::Boolean(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Value::Boolean(false),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

pub(super) fn cast_datetime(args: &[Value]) -> Value {
    match &args[0] {
        Value::DateTime(dt) => Value::DateTime(*dt),
        Value::String(s) => parse_datetime(s).map_or(Value::Null, Value::DateTime),
        Value::Integer(_) | Value::Real(_) | Value::Decimal(_) => args[0]
            .as_i64()
            .and_then(datetime_from_millis)
            .map_or(Value::Null, Value::DateTime),
        _ => Value::Null,
    }
}

pub(super) fn cast_interval(args: &[Value]) -> Value {
    match &args[0] {
        Value::Interval(iv) => Value::Interval(*iv),
        Value::String(s) => Interval::parse(s).map_or(Value::Null, Value::Interval),
        Value::Integer(_) | Value::Real(_) | Value::Decimal(_) => args[0]
            .as_i64()
            .map_or(Value::Null, |ms| Value::Interval(Interval::new(0, 0, ms))),
        _ => Value::Null,
    }
}

/// `timestamptz(v, zone?)`: re-expresses the instant in the given zone
/// offset (`+02:00`, `-05:30`, `Z`, `UTC`).
fn cast_timestamptz(args: &[Value]) -> Value {
    let Value::DateTime(dt) = cast_datetime(&args[..1]) else {
        return Value::Null;
    };
    let Some(zone) = args.get(1) else {
        return Value::DateTime(dt);
    };
    let Value::String(zone) = zone else {
        return Value::Null;
    };
    parse_zone(zone).map_or(Value::Null, |offset| {
        Value::DateTime(dt.with_timezone(&offset))
    })
}

fn parse_zone(zone: &str) -> Option<chrono::FixedOffset> {
    let zone = zone.trim();
    if zone.eq_ignore_ascii_case("utc") || zone == "Z" || zone == "z" {
        return chrono::FixedOffset::east_opt(0);
    }
    let (sign, rest) = match zone.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, zone.strip_prefix('+').unwrap_or(zone)),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    chrono::FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ---------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------

fn abs_value(args: &[Value]) -> Value {
    match &args[0] {
        Value::Integer(i) => i.checked_abs().map_or(Value::Null, Value::Integer),
        Value::Real(f) => Value::Real(f.abs()),
        Value::Decimal(d) => Value::Decimal(d.abs()),
        _ => Value::Null,
    }
}

fn round_to(value: &Value, digits: i64) -> Value {
    match value {
        Value::Integer(i) => Value::Integer(*i),
        Value::Real(f) => {
            let factor = 10f64.powi(digits as i32);
            Value::Real((f * factor).round() / factor)
        }
        Value::Decimal(d) => Value::Decimal(d.round_dp(digits.max(0) as u32)),
        _ => Value::Null,
    }
}

fn round_default(args: &[Value]) -> Value {
    round_to(&args[0], 2)
}

fn round_digits(args: &[Value]) -> Value {
    let Some(digits) = args[1].as_i64() else {
        return Value::Null;
    };
    round_to(&args[0], digits)
}

/// `to_fixed(x, d)` renders a number with exactly `d` decimal places.
fn to_fixed(args: &[Value]) -> Value {
    let Some(digits) = args[1].as_i64() else {
        return Value::Null;
    };
    let digits = digits.clamp(0, 30) as usize;
    match &args[0] {
        Value::Decimal(d) => Value::String(format!("{:.digits$}", d.to_f64().unwrap_or(0.0))),
        other => other
            .as_f64()
            .map_or(Value::Null, |f| Value::String(format!("{f:.digits$}"))),
    }
}

/// `safediv(a, b)` is division that yields 0 instead of Null on b = 0.
fn safediv(args: &[Value]) -> Value {
    match (&args[0], &args[1]) {
        (Value::Integer(_), Value::Integer(b)) if *b == 0 => Value::Integer(0),
        (Value::Integer(_), Value::Integer(_)) => div_int(args),
        (Value::Decimal(_), _) | (_, Value::Decimal(_)) => {
            match decimal_pair(args) {
                Some((_, b)) if b.is_zero() => Value::Decimal(Decimal::ZERO),
                Some((a, b)) => a.checked_div(b).map_or(Value::Null, Value::Decimal),
                None => Value::Null,
            }
        }
        _ => match real_pair(args) {
            Some((_, b)) if b == 0.0 => Value::Real(0.0),
            Some((a, b)) => Value::Real(a / b),
            None => Value::Null,
        },
    }
}

/// Null-safe `nullif(a, b)`: Null when the operands are equal.
fn nullif(args: &[Value]) -> Value {
    if args[0] == args[1] {
        Value::Null
    } else {
        args[0].clone()
    }
}

// ---------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------

fn numeric_binop(
    reg: &mut Registry,
    name: &'static str,
    int_fn: ScalarFn,
    real_fn: ScalarFn,
    decimal_fn: ScalarFn,
) {
    function(
        reg,
        name,
        true,
        vec![
            sig(&[DType::Integer, DType::Integer], DType::Integer, int_fn),
            sig(&[DType::Real, DType::Real], DType::Real, real_fn),
            sig(&[DType::Decimal, DType::Decimal], DType::Decimal, decimal_fn),
            sig(&[DType::Decimal, DType::Integer], DType::Decimal, decimal_fn),
            sig(&[DType::Integer, DType::Decimal], DType::Decimal, decimal_fn),
            sig(&[DType::Decimal, DType::Real], DType::Real, real_fn),
            sig(&[DType::Real, DType::Decimal], DType::Real, real_fn),
        ],
    );
}

fn comparison(reg: &mut Registry, name: &'static str, eval: ScalarFn) {
    function(
        reg,
        name,
        true,
        vec![sig(&[DType::Object, DType::Object], DType::Boolean, eval)],
    );
}

pub(super) fn install(reg: &mut Registry) {
    numeric_binop(reg, "+", add_int, add_real, add_decimal);
    numeric_binop(reg, "-", sub_int, sub_real, sub_decimal);
    numeric_binop(reg, "*", mul_int, mul_real, mul_decimal);
    numeric_binop(reg, "/", div_int, div_real, div_decimal);
    numeric_binop(reg, "%", mod_int, mod_real, mod_decimal);

    // Number/string concatenation and temporal arithmetic ride on `+`/`-`.
    function(
        reg,
        "+",
        true,
        vec![
            sig(&[DType::String, DType::Object], DType::String, add_concat),
            sig(&[DType::Object, DType::String], DType::String, add_concat),
            sig(&[DType::DateTime, DType::Real], DType::DateTime, datetime_add_days),
            sig(&[DType::Real, DType::DateTime], DType::DateTime, datetime_add_days),
            sig(&[DType::DateTime, DType::Interval], DType::DateTime, datetime_add_interval),
            sig(&[DType::Interval, DType::DateTime], DType::DateTime, datetime_add_interval),
            sig(&[DType::Interval, DType::Interval], DType::Interval, interval_add),
        ],
    );
    function(
        reg,
        "-",
        true,
        vec![
            sig(&[DType::DateTime, DType::Real], DType::DateTime, datetime_sub_days),
            sig(&[DType::DateTime, DType::Interval], DType::DateTime, datetime_sub_interval),
            sig(&[DType::Interval, DType::Interval], DType::Interval, interval_sub),
        ],
    );
    function(
        reg,
        "neg",
        true,
        vec![
            sig(&[DType::Integer], DType::Integer, neg),
            sig(&[DType::Real], DType::Real, neg),
            sig(&[DType::Decimal], DType::Decimal, neg),
            sig(&[DType::Interval], DType::Interval, neg),
            sig(&[DType::Object], DType::Object, neg),
        ],
    );

    comparison(reg, "=", cmp_eq);
    comparison(reg, "!=", cmp_ne);
    comparison(reg, "<", cmp_lt);
    comparison(reg, "<=", cmp_le);
    comparison(reg, ">", cmp_gt);
    comparison(reg, ">=", cmp_ge);

    // Casts; the names double as the DDL type-name registry.
    for name in ["int", "integer"] {
        function(reg, name, true, vec![sig(&[DType::Object], DType::Integer, cast_integer)]);
        reg.add_cast(name, DType::Integer);
    }
    for name in ["real", "number", "float", "double"] {
        function(reg, name, true, vec![sig(&[DType::Object], DType::Real, cast_real)]);
        reg.add_cast(name, DType::Real);
    }
    for name in ["numeric", "decimal"] {
        function(reg, name, true, vec![sig(&[DType::Object], DType::Decimal, cast_decimal)]);
        reg.add_cast(name, DType::Decimal);
    }
    for name in ["string", "text"] {
        function(reg, name, true, vec![sig(&[DType::Object], DType::String, cast_string)]);
        reg.add_cast(name, DType::String);
    }
    for name in ["boolean", "bool"] {
        function(reg, name, true, vec![sig(&[DType::Object], DType::Boolean, cast_boolean)]);
        reg.add_cast(name, DType::Boolean);
    }
    for name in ["datetime", "timestamp"] {
        function(reg, name, true, vec![sig(&[DType::Object], DType::DateTime, cast_datetime)]);
        reg.add_cast(name, DType::DateTime);
    }
    function(
        reg,
        "timestamptz",
        true,
        vec![
            sig(&[DType::Object], DType::DateTime, cast_timestamptz),
            sig(&[DType::Object, DType::String], DType::DateTime, cast_timestamptz),
        ],
    );
    reg.add_cast("timestamptz", DType::DateTime);
    for name in ["interval", "duration"] {
        function(reg, name, true, vec![sig(&[DType::Object], DType::Interval, cast_interval)]);
        reg.add_cast(name, DType::Interval);
    }
    reg.add_cast("null", DType::Null);
    reg.add_cast("any", DType::Object);
    reg.add_cast("object", DType::Object);

    function(
        reg,
        "abs",
        true,
        vec![
            sig(&[DType::Integer], DType::Integer, abs_value),
            sig(&[DType::Real], DType::Real, abs_value),
            sig(&[DType::Decimal], DType::Decimal, abs_value),
        ],
    );
    function(
        reg,
        "round",
        true,
        vec![
            sig(&[DType::Real], DType::Real, round_default),
            sig(&[DType::Real, DType::Integer], DType::Real, round_digits),
            sig(&[DType::Decimal], DType::Decimal, round_default),
            sig(&[DType::Decimal, DType::Integer], DType::Decimal, round_digits),
        ],
    );
    function(
        reg,
        "tofixed",
        true,
        vec![
            sig(&[DType::Real, DType::Integer], DType::String, to_fixed),
            sig(&[DType::Decimal, DType::Integer], DType::String, to_fixed),
        ],
    );
    function(
        reg,
        "safediv",
        true,
        vec![
            sig(&[DType::Integer, DType::Integer], DType::Integer, safediv),
            sig(&[DType::Real, DType::Real], DType::Real, safediv),
            sig(&[DType::Decimal, DType::Decimal], DType::Decimal, safediv),
            sig(&[DType::Decimal, DType::Real], DType::Real, safediv),
            sig(&[DType::Real, DType::Decimal], DType::Real, safediv),
        ],
    );
    function(
        reg,
        "nullif",
        true,
        vec![null_safe_sig(&[DType::Object, DType::Object], DType::Object, nullif)],
    );
}

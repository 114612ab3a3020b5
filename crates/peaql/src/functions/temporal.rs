//! Datetime and interval built-ins.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, TimeZone,
    Timelike, Utc,
};

use super::scalar::{function, sig};
use super::strings::translate_datetime_pattern;
use crate::registry::Registry;
use crate::types::{attribute, DType};
use crate::value::{parse_datetime, Interval, Value};

/// Applies a calendar interval to an instant: months first, then days,
/// then the clock part.
pub(super) fn shift_datetime(
    dt: DateTime<FixedOffset>,
    interval: &Interval,
) -> Option<DateTime<FixedOffset>> {
    let shifted = if interval.months >= 0 {
        dt.checked_add_months(Months::new(interval.months.unsigned_abs()))?
    } else {
        dt.checked_sub_months(Months::new(interval.months.unsigned_abs()))?
    };
    let millis = i64::from(interval.days) * 86_400_000 + interval.millis;
    shifted.checked_add_signed(Duration::milliseconds(millis))
}

fn now(_: &[Value]) -> Value {
    Value::DateTime(Utc::now().fixed_offset())
}

fn today(_: &[Value]) -> Value {
    let date = Utc::now().date_naive();
    date.and_hms_opt(0, 0, 0)
        .map_or(Value::Null, |naive| Value::DateTime(naive.and_utc().fixed_offset()))
}

macro_rules! attr_fn {
    ($fn_name:ident, $attr:literal) => {
        fn $fn_name(args: &[Value]) -> Value {
            attribute(&DType::DateTime, $attr).map_or(Value::Null, |attr| (attr.get)(&args[0]))
        }
    };
}

attr_fn!(extract_year, "year");
attr_fn!(extract_month, "month");
attr_fn!(extract_day, "day");
attr_fn!(extract_hour, "hour");
attr_fn!(extract_minute, "minute");
attr_fn!(extract_second, "second");
attr_fn!(extract_quarter, "quarter");
attr_fn!(extract_weekday, "weekday");
attr_fn!(extract_yearmonth, "yearmonth");

fn field_unit(text: &str) -> Option<&'static str> {
    match text.trim().to_ascii_lowercase().as_str() {
        "year" | "years" | "y" => Some("year"),
        "quarter" | "quarters" => Some("quarter"),
        "month" | "months" | "mon" => Some("month"),
        "week" | "weeks" | "w" => Some("week"),
        "day" | "days" | "d" => Some("day"),
        "hour" | "hours" | "h" => Some("hour"),
        "minute" | "minutes" | "min" | "mins" => Some("minute"),
        "second" | "seconds" | "sec" | "secs" => Some("second"),
        "millisecond" | "milliseconds" | "ms" => Some("millisecond"),
        "epoch" => Some("epoch"),
        "weekday" | "dow" => Some("weekday"),
        _ => None,
    }
}

fn unit_millis(unit: &str) -> Option<i64> {
    match unit {
        "week" => Some(7 * 86_400_000),
        "day" => Some(86_400_000),
        "hour" => Some(3_600_000),
        "minute" => Some(60_000),
        "second" => Some(1_000),
        "millisecond" => Some(1),
        _ => None,
    }
}

/// `date_part(field, dt)` / `extract`.
fn date_part(args: &[Value]) -> Value {
    let (Value::String(field), Value::DateTime(dt)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    let Some(unit) = field_unit(field) else {
        return Value::Null;
    };
    match unit {
        "year" => Value::Integer(i64::from(dt.year())),
        "quarter" => Value::Integer(i64::from((dt.month() - 1) / 3 + 1)),
        "month" => Value::Integer(i64::from(dt.month())),
        "week" => Value::Integer(i64::from(dt.iso_week().week())),
        "day" => Value::Integer(i64::from(dt.day())),
        "hour" => Value::Integer(i64::from(dt.hour())),
        "minute" => Value::Integer(i64::from(dt.minute())),
        "second" => Value::Integer(i64::from(dt.second())),
        "millisecond" => Value::Integer(i64::from(dt.timestamp_subsec_millis())),
        "epoch" => Value::Integer(dt.timestamp_millis()),
        "weekday" => Value::Integer(i64::from(dt.weekday().number_from_monday())),
        _ => Value::Null,
    }
}

fn start_of(unit: &str, dt: &DateTime<FixedOffset>) -> Option<NaiveDateTime> {
    let date = dt.date_naive();
    match unit {
        "year" => NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_hms_opt(0, 0, 0),
        "quarter" => {
            let month = (date.month0() / 3) * 3 + 1;
            NaiveDate::from_ymd_opt(date.year(), month, 1)?.and_hms_opt(0, 0, 0)
        }
        "month" => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?.and_hms_opt(0, 0, 0),
        "week" => {
            let shift = i64::from(date.weekday().num_days_from_monday());
            (date - Duration::days(shift)).and_hms_opt(0, 0, 0)
        }
        "day" => date.and_hms_opt(0, 0, 0),
        "hour" => date.and_hms_opt(dt.hour(), 0, 0),
        "minute" => date.and_hms_opt(dt.hour(), dt.minute(), 0),
        "second" => date.and_hms_opt(dt.hour(), dt.minute(), dt.second()),
        _ => None,
    }
}

/// `date_trunc(unit, dt)` / `date_start`: the start of the period.
fn date_trunc(args: &[Value]) -> Value {
    let (Value::String(unit), Value::DateTime(dt)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    let Some(unit) = field_unit(unit) else {
        return Value::Null;
    };
    start_of(unit, dt)
        .and_then(|naive| dt.timezone().from_local_datetime(&naive).single())
        .map_or(Value::Null, Value::DateTime)
}

/// `date_end(unit, dt)` / `date_trunc_end`: the last millisecond of the
/// period.
fn date_end(args: &[Value]) -> Value {
    let (Value::String(unit), Value::DateTime(dt)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    let Some(unit) = field_unit(unit) else {
        return Value::Null;
    };
    let Some(start) = start_of(unit, dt)
        .and_then(|naive| dt.timezone().from_local_datetime(&naive).single())
    else {
        return Value::Null;
    };
    let next = match unit {
        "year" => shift_datetime(start, &Interval::new(12, 0, 0)),
        "quarter" => shift_datetime(start, &Interval::new(3, 0, 0)),
        "month" => shift_datetime(start, &Interval::new(1, 0, 0)),
        other => unit_millis(other).and_then(|ms| start.checked_add_signed(Duration::milliseconds(ms))),
    };
    next.map_or(Value::Null, |next| {
        Value::DateTime(next - Duration::milliseconds(1))
    })
}

/// `date_add(dt, interval)` / `date_add(dt, n[, unit])` (days by default).
fn date_add(args: &[Value]) -> Value {
    let Value::DateTime(dt) = &args[0] else {
        return Value::Null;
    };
    match (&args[1], args.get(2)) {
        (Value::Interval(iv), None) => {
            shift_datetime(*dt, iv).map_or(Value::Null, Value::DateTime)
        }
        (amount, None) => amount.as_f64().map_or(Value::Null, |days| {
            Value::DateTime(*dt + Duration::milliseconds((days * 86_400_000.0) as i64))
        }),
        (amount, Some(Value::String(unit))) => {
            let Some(n) = amount.as_i64() else {
                return Value::Null;
            };
            let Some(unit) = field_unit(unit) else {
                return Value::Null;
            };
            let interval = match unit {
                "year" => Interval::new((n * 12) as i32, 0, 0),
                "quarter" => Interval::new((n * 3) as i32, 0, 0),
                "month" => Interval::new(n as i32, 0, 0),
                other => match unit_millis(other) {
                    Some(ms) => Interval::new(0, 0, n * ms),
                    None => return Value::Null,
                },
            };
            shift_datetime(*dt, &interval).map_or(Value::Null, Value::DateTime)
        }
        _ => Value::Null,
    }
}

/// `date_diff(a, b[, unit])`: `b - a` in whole units (days by default);
/// month-family units count calendar boundaries.
fn date_diff(args: &[Value]) -> Value {
    let (Value::DateTime(a), Value::DateTime(b)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    let unit = match args.get(2) {
        Some(Value::String(unit)) => match field_unit(unit) {
            Some(unit) => unit,
            None => return Value::Null,
        },
        None => "day",
        Some(_) => return Value::Null,
    };
    match unit {
        "year" => Value::Integer(i64::from(b.year() - a.year())),
        "quarter" => {
            let q = |dt: &DateTime<FixedOffset>| i64::from(dt.year()) * 4 + i64::from(dt.month0() / 3);
            Value::Integer(q(b) - q(a))
        }
        "month" => {
            let m = |dt: &DateTime<FixedOffset>| i64::from(dt.year()) * 12 + i64::from(dt.month0());
            Value::Integer(m(b) - m(a))
        }
        other => unit_millis(other).map_or(Value::Null, |ms| {
            Value::Integer((b.timestamp_millis() - a.timestamp_millis()) / ms)
        }),
    }
}

/// `date_bin(stride, dt[, origin])`: floors `dt` into stride-sized bins
/// anchored at `origin` (the epoch by default).
fn date_bin(args: &[Value]) -> Value {
    let (Value::Interval(stride), Value::DateTime(dt)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    let origin = match args.get(2) {
        Some(Value::DateTime(origin)) => origin.timestamp_millis(),
        None => 0,
        Some(_) => return Value::Null,
    };
    if stride.months != 0 {
        // Month-based strides bin on calendar month counts.
        let months = i64::from(stride.months);
        let dt_months = i64::from(dt.year()) * 12 + i64::from(dt.month0());
        let binned = dt_months - dt_months.rem_euclid(months);
        let year = binned.div_euclid(12);
        let month = binned.rem_euclid(12) as u32 + 1;
        return NaiveDate::from_ymd_opt(year as i32, month, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map_or(Value::Null, |naive| {
                Value::DateTime(naive.and_utc().fixed_offset())
            });
    }
    let step = stride.total_millis();
    if step <= 0 {
        return Value::Null;
    }
    let millis = dt.timestamp_millis();
    let binned = millis - (millis - origin).rem_euclid(step);
    crate::value::datetime_from_millis(binned).map_or(Value::Null, Value::DateTime)
}

/// `parse_date(text[, fmt])` with PG-style format patterns.
fn parse_date(args: &[Value]) -> Value {
    let Value::String(text) = &args[0] else {
        return Value::Null;
    };
    match args.get(1) {
        None => parse_datetime(text).map_or(Value::Null, Value::DateTime),
        Some(Value::String(pattern)) => {
            let translated = translate_datetime_pattern(pattern);
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, &translated) {
                return Value::DateTime(naive.and_utc().fixed_offset());
            }
            NaiveDate::parse_from_str(text, &translated)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map_or(Value::Null, |naive| {
                    Value::DateTime(naive.and_utc().fixed_offset())
                })
        }
        Some(_) => Value::Null,
    }
}

pub(super) fn install(reg: &mut Registry) {
    // Clock reads are not pure: they never constant-fold.
    function(reg, "now", false, vec![sig(&[], DType::DateTime, now)]);
    function(reg, "today", false, vec![sig(&[], DType::DateTime, today)]);

    let extractors: [(&'static str, fn(&[Value]) -> Value); 9] = [
        ("year", extract_year),
        ("month", extract_month),
        ("day", extract_day),
        ("hour", extract_hour),
        ("minute", extract_minute),
        ("second", extract_second),
        ("quarter", extract_quarter),
        ("weekday", extract_weekday),
        ("yearmonth", extract_yearmonth),
    ];
    for (name, eval) in extractors {
        function(reg, name, true, vec![sig(&[DType::DateTime], DType::Integer, eval)]);
    }

    function(
        reg,
        "date_part",
        true,
        vec![sig(&[DType::String, DType::DateTime], DType::Integer, date_part)],
    );
    for name in ["date_trunc", "date_start"] {
        function(
            reg,
            name,
            true,
            vec![sig(&[DType::String, DType::DateTime], DType::DateTime, date_trunc)],
        );
    }
    for name in ["date_end", "date_trunc_end"] {
        function(
            reg,
            name,
            true,
            vec![sig(&[DType::String, DType::DateTime], DType::DateTime, date_end)],
        );
    }
    function(
        reg,
        "date_add",
        true,
        vec![
            sig(&[DType::DateTime, DType::Interval], DType::DateTime, date_add),
            sig(&[DType::DateTime, DType::Real], DType::DateTime, date_add),
            sig(&[DType::DateTime, DType::Real, DType::String], DType::DateTime, date_add),
        ],
    );
    function(
        reg,
        "date_diff",
        true,
        vec![
            sig(&[DType::DateTime, DType::DateTime], DType::Integer, date_diff),
            sig(&[DType::DateTime, DType::DateTime, DType::String], DType::Integer, date_diff),
        ],
    );
    function(
        reg,
        "date_bin",
        true,
        vec![
            sig(&[DType::Interval, DType::DateTime], DType::DateTime, date_bin),
            sig(&[DType::Interval, DType::DateTime, DType::DateTime], DType::DateTime, date_bin),
        ],
    );
    function(
        reg,
        "parse_date",
        true,
        vec![
            sig(&[DType::String], DType::DateTime, parse_date),
            sig(&[DType::String, DType::String], DType::DateTime, parse_date),
        ],
    );
}

//! The dynamically tagged value model.
//!
//! Equality and ordering are semantic: `1 = 1.0 = 1.00`, datetimes compare
//! by epoch milliseconds, intervals by total milliseconds, collections
//! elementwise. NaN and infinities normalize to Null on output.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::types::DType;

/// A calendar+clock interval: months, days and sub-day milliseconds are
/// tracked separately so calendar arithmetic stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    /// Whole months (years fold into months).
    pub months: i32,
    /// Whole days.
    pub days: i32,
    /// Clock part in milliseconds.
    pub millis: i64,
}

const MILLIS_PER_DAY: i64 = 86_400_000;

impl Interval {
    /// Creates an interval from its components.
    #[must_use]
    pub const fn new(months: i32, days: i32, millis: i64) -> Self {
        Self {
            months,
            days,
            millis,
        }
    }

    /// Total milliseconds using the 30-day month / 24-hour day convention;
    /// used for comparisons only.
    #[must_use]
    pub fn total_millis(&self) -> i64 {
        i64::from(self.months) * 30 * MILLIS_PER_DAY
            + i64::from(self.days) * MILLIS_PER_DAY
            + self.millis
    }

    /// Component-wise negation.
    #[must_use]
    pub fn negate(&self) -> Self {
        Self::new(-self.months, -self.days, -self.millis)
    }

    /// Component-wise sum.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        Self::new(
            self.months + other.months,
            self.days + other.days,
            self.millis + other.millis,
        )
    }

    /// Parses an interval from text.
    ///
    /// Accepted forms: ISO 8601 durations (`P1Y2M3DT4H5M6.5S`), clock
    /// notation (`HH:MM[:SS[.fff]]`), and unit phrases
    /// (`1 year 2 months 3 days`, `90 minutes`, `1w 2d 3h 45m 30s`).
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if text.starts_with('P') || text.starts_with("-P") {
            return Self::parse_iso8601(text);
        }
        if text.contains(':') && !text.chars().any(char::is_alphabetic) {
            return Self::parse_clock(text);
        }
        Self::parse_phrase(text)
    }

    fn parse_iso8601(text: &str) -> Option<Self> {
        let (negative, rest) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let rest = rest.strip_prefix('P')?;
        let (date_part, time_part) = match rest.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (rest, None),
        };

        let mut interval = Self::default();
        let mut number = String::new();
        for c in date_part.chars() {
            if c.is_ascii_digit() || c == '.' || c == '-' {
                number.push(c);
            } else {
                let n: f64 = number.parse().ok()?;
                number.clear();
                match c {
                    'Y' => interval.months += (n as i32) * 12,
                    'M' => interval.months += n as i32,
                    'W' => interval.days += (n as i32) * 7,
                    'D' => interval.days += n as i32,
                    _ => return None,
                }
            }
        }
        if let Some(time_part) = time_part {
            for c in time_part.chars() {
                if c.is_ascii_digit() || c == '.' || c == '-' {
                    number.push(c);
                } else {
                    let n: f64 = number.parse().ok()?;
                    number.clear();
                    match c {
                        'H' => interval.millis += (n * 3_600_000.0) as i64,
                        'M' => interval.millis += (n * 60_000.0) as i64,
                        'S' => interval.millis += (n * 1_000.0) as i64,
                        _ => return None,
                    }
                }
            }
        }
        if !number.is_empty() {
            return None;
        }
        Some(if negative { interval.negate() } else { interval })
    }

    fn parse_clock(text: &str) -> Option<Self> {
        let (negative, rest) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return None;
        }
        let hours: i64 = parts[0].parse().ok()?;
        let minutes: i64 = parts[1].parse().ok()?;
        let seconds: f64 = if parts.len() == 3 {
            parts[2].parse().ok()?
        } else {
            0.0
        };
        let millis = hours * 3_600_000 + minutes * 60_000 + (seconds * 1000.0) as i64;
        let interval = Self::new(0, 0, millis);
        Some(if negative { interval.negate() } else { interval })
    }

    fn parse_phrase(text: &str) -> Option<Self> {
        let mut interval = Self::default();
        let mut any = false;
        let mut tokens = text.split_whitespace().peekable();
        while let Some(token) = tokens.next() {
            // Either "3days" in one token or "3 days" in two.
            let split = token.find(|c: char| c.is_alphabetic());
            let (amount, unit) = match split {
                Some(0) => return None,
                Some(i) => (&token[..i], &token[i..]),
                None => (token, tokens.next()?),
            };
            let n: f64 = amount.parse().ok()?;
            match unit.trim_end_matches('s').to_ascii_lowercase().as_str() {
                "year" | "yr" | "y" => interval.months += (n as i32) * 12,
                "month" | "mon" | "mo" => interval.months += n as i32,
                "week" | "w" => interval.days += (n as i32) * 7,
                "day" | "d" => interval.days += n as i32,
                "hour" | "hr" | "h" => interval.millis += (n * 3_600_000.0) as i64,
                "minute" | "min" | "m" => interval.millis += (n * 60_000.0) as i64,
                "second" | "sec" => interval.millis += (n * 1_000.0) as i64,
                "millisecond" | "ms" => interval.millis += n as i64,
                _ => return None,
            }
            any = true;
        }
        any.then_some(interval)
    }

    /// Renders the interval as an ISO 8601 duration.
    #[must_use]
    pub fn to_iso8601(&self) -> String {
        if self.months == 0 && self.days == 0 && self.millis == 0 {
            return "PT0S".into();
        }
        let mut out = String::from("P");
        let years = self.months / 12;
        let months = self.months % 12;
        if years != 0 {
            out.push_str(&format!("{years}Y"));
        }
        if months != 0 {
            out.push_str(&format!("{months}M"));
        }
        if self.days != 0 {
            out.push_str(&format!("{}D", self.days));
        }
        if self.millis != 0 {
            out.push('T');
            let total_seconds = self.millis as f64 / 1000.0;
            let hours = (total_seconds / 3600.0).trunc();
            let minutes = ((total_seconds - hours * 3600.0) / 60.0).trunc();
            let seconds = total_seconds - hours * 3600.0 - minutes * 60.0;
            if hours != 0.0 {
                out.push_str(&format!("{hours:.0}H"));
            }
            if minutes != 0.0 {
                out.push_str(&format!("{minutes:.0}M"));
            }
            if seconds != 0.0 {
                if (seconds - seconds.trunc()).abs() < f64::EPSILON {
                    out.push_str(&format!("{seconds:.0}S"));
                } else {
                    out.push_str(&format!("{seconds}S"));
                }
            }
        }
        out
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// A hashable projection of [`Value`] consistent with semantic equality.
///
/// Backs group lookup, DISTINCT, IN and the equi-join hash path: numerics
/// collapse to a normalized decimal so `1`, `1.0` and `1.00` share a key;
/// NaN projects to the Null key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Null (and non-finite reals).
    Null,
    /// Booleans.
    Bool(bool),
    /// Any numeric value, normalized.
    Number(Decimal),
    /// Strings.
    Text(String),
    /// Datetimes, by epoch milliseconds.
    Time(i64),
    /// Intervals, by total milliseconds.
    Span(i64),
    /// Lists and sets, elementwise.
    List(Vec<Key>),
}

/// A dynamically tagged value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The null value.
    #[default]
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// IEEE-754 double.
    Real(f64),
    /// Fixed-scale decimal.
    Decimal(Decimal),
    /// Boolean.
    Boolean(bool),
    /// UTF-8 string.
    String(String),
    /// Instant with offset.
    DateTime(DateTime<FixedOffset>),
    /// Calendar+clock interval.
    Interval(Interval),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Set of values (order preserved, first occurrence wins).
    Set(Vec<Value>),
}

impl Value {
    /// Returns the type tag of this value.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null => DType::Null,
            Self::Integer(_) => DType::Integer,
            Self::Real(_) => DType::Real,
            Self::Decimal(_) => DType::Decimal,
            Self::Boolean(_) => DType::Boolean,
            Self::String(_) => DType::String,
            Self::DateTime(_) => DType::DateTime,
            Self::Interval(_) => DType::Interval,
            Self::List(items) | Self::Set(items) => {
                let elem = items.first().map_or(DType::Object, Self::dtype);
                DType::List(Box::new(elem))
            }
        }
    }

    /// Returns true for Null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value, if it has one.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Real(f) => Decimal::from_f64(*f),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// f64 view of the value, if it has one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(f) => Some(*f),
            Self::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// i64 view of the value, truncating decimals toward zero.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Real(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::Decimal(d) => d.trunc().to_i64(),
            _ => None,
        }
    }

    /// Three-valued truthiness: Null is unknown, numbers are true when
    /// non-zero, everything else non-null is true.
    #[must_use]
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Self::Null => None,
            Self::Boolean(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            Self::Real(f) => {
                if f.is_nan() {
                    None
                } else {
                    Some(*f != 0.0)
                }
            }
            Self::Decimal(d) => Some(!d.is_zero()),
            _ => Some(true),
        }
    }

    /// Epoch milliseconds for datetime comparison, coercing strings and
    /// numbers.
    fn epoch_millis(&self) -> Option<i64> {
        match self {
            Self::DateTime(dt) => Some(dt.timestamp_millis()),
            Self::String(s) => parse_datetime(s).map(|dt| dt.timestamp_millis()),
            Self::Integer(_) | Self::Real(_) | Self::Decimal(_) => self.as_i64(),
            _ => None,
        }
    }

    /// Total interval milliseconds for comparison, coercing strings and
    /// numbers.
    fn interval_millis(&self) -> Option<i64> {
        match self {
            Self::Interval(iv) => Some(iv.total_millis()),
            Self::String(s) => Interval::parse(s).map(|iv| iv.total_millis()),
            Self::Integer(_) | Self::Real(_) | Self::Decimal(_) => self.as_i64(),
            _ => None,
        }
    }

    /// Semantic comparison across compatible types; `None` means the
    /// comparison is undefined (three-valued NULL).
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::DateTime(_), _) | (_, Self::DateTime(_)) => {
                Some(self.epoch_millis()?.cmp(&other.epoch_millis()?))
            }
            (Self::Interval(_), _) | (_, Self::Interval(_)) => {
                Some(self.interval_millis()?.cmp(&other.interval_millis()?))
            }
            (Self::List(a) | Self::Set(a), Self::List(b) | Self::Set(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => {}
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => {
                let a = self.as_decimal()?;
                let b = other.as_decimal()?;
                Some(a.cmp(&b))
            }
        }
    }

    /// Projects the value onto its hashable key.
    #[must_use]
    pub fn key(&self) -> Key {
        match self {
            Self::Null => Key::Null,
            Self::Boolean(b) => Key::Bool(*b),
            Self::Integer(i) => Key::Number(Decimal::from(*i).normalize()),
            Self::Real(f) => Decimal::from_f64(*f)
                .map_or(Key::Null, |d| Key::Number(d.normalize())),
            Self::Decimal(d) => Key::Number(d.normalize()),
            Self::String(s) => Key::Text(s.clone()),
            Self::DateTime(dt) => Key::Time(dt.timestamp_millis()),
            Self::Interval(iv) => Key::Span(iv.total_millis()),
            Self::List(items) | Self::Set(items) => {
                Key::List(items.iter().map(Self::key).collect())
            }
        }
    }

    /// Normalizes the value for output: non-finite reals become Null.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Real(f) if !f.is_finite() => Self::Null,
            Self::List(items) => Self::List(items.into_iter().map(Self::normalized).collect()),
            Self::Set(items) => Self::Set(items.into_iter().map(Self::normalized).collect()),
            other => other,
        }
    }

    /// Converts a JSON value into an engine value.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    Self::Real(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(_) => Self::Null,
        }
    }

    /// Converts the value into JSON. Datetimes render as RFC 3339,
    /// decimals as strings (preserving scale), intervals as ISO 8601.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Real(f) => {
                if f.is_finite() {
                    serde_json::Value::from(*f)
                } else {
                    serde_json::Value::Null
                }
            }
            Self::Decimal(d) => serde_json::Value::String(d.to_string()),
            Self::Boolean(b) => serde_json::Value::from(*b),
            Self::String(s) => serde_json::Value::from(s.clone()),
            Self::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::Interval(iv) => serde_json::Value::String(iv.to_iso8601()),
            Self::List(items) | Self::Set(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::String(s) => f.write_str(s),
            Self::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            Self::Interval(iv) => write!(f, "{iv}"),
            Self::List(items) | Self::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if matches!(item, Self::String(_)) {
                        write!(f, "'{item}'")?;
                    } else if item.is_null() {
                        write!(f, "null")?;
                    } else {
                        write!(f, "{item}")?;
                    }
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

/// Parses a datetime from text.
///
/// Accepts RFC 3339, `YYYY-MM-DD[ HH:MM[:SS[.fff]]]` (`T` separator also
/// allowed, assumed UTC when no offset is present), and `MM/DD/YYYY`.
#[must_use]
pub fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc().fixed_offset());
        }
    }
    None
}

/// Builds a datetime from epoch milliseconds.
#[must_use]
pub fn datetime_from_millis(millis: i64) -> Option<DateTime<FixedOffset>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_across_types() {
        assert_eq!(Value::Integer(1), Value::Real(1.0));
        assert_eq!(Value::Integer(1), Value::Decimal(Decimal::new(100, 2)));
        assert_ne!(Value::Integer(1), Value::Real(1.5));
    }

    #[test]
    fn test_null_is_not_equal_to_itself_via_compare() {
        assert_eq!(Value::Null.compare(&Value::Null), None);
        // ...but grouping equality treats Null as one key.
        assert_eq!(Value::Null.key(), Key::Null);
    }

    #[test]
    fn test_keys_collapse_numerics() {
        assert_eq!(Value::Integer(1).key(), Value::Real(1.0).key());
        assert_eq!(
            Value::Decimal(Decimal::new(2500, 3)).key(),
            Value::Real(2.5).key()
        );
        assert_eq!(Value::Real(f64::NAN).key(), Key::Null);
    }

    #[test]
    fn test_datetime_string_comparison() {
        let dt = parse_datetime("2024-03-01").unwrap();
        assert_eq!(
            Value::DateTime(dt).compare(&Value::String("2024-03-01".into())),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::DateTime(dt).compare(&Value::String("2024-03-02".into())),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!(
            Interval::parse("P1Y2M3DT4H5M6S"),
            Some(Interval::new(14, 3, 4 * 3_600_000 + 5 * 60_000 + 6_000))
        );
        assert_eq!(Interval::parse("02:30"), Some(Interval::new(0, 0, 9_000_000)));
        assert_eq!(
            Interval::parse("1 year 2 months"),
            Some(Interval::new(14, 0, 0))
        );
        assert_eq!(Interval::parse("90 minutes"), Some(Interval::new(0, 0, 5_400_000)));
        assert_eq!(Interval::parse("1w 2d"), Some(Interval::new(0, 9, 0)));
        assert_eq!(Interval::parse("bogus"), None);
    }

    #[test]
    fn test_interval_iso_round_trip() {
        let iv = Interval::new(14, 3, 3_600_000);
        assert_eq!(Interval::parse(&iv.to_iso8601()), Some(iv));
    }

    #[test]
    fn test_normalized_nan() {
        assert!(Value::Real(f64::NAN).normalized().is_null());
        assert!(Value::Real(f64::INFINITY).normalized().is_null());
        assert_eq!(Value::Real(2.0).normalized(), Value::Real(2.0));
    }

    #[test]
    fn test_json_round_trip() {
        let value = Value::List(vec![
            Value::Integer(1),
            Value::String("x".into()),
            Value::Null,
        ]);
        assert_eq!(Value::from_json(&value.to_json()), value);
    }

    #[test]
    fn test_truthiness() {
        assert_eq!(Value::Null.truthy(), None);
        assert_eq!(Value::Boolean(false).truthy(), Some(false));
        assert_eq!(Value::Integer(0).truthy(), Some(false));
        assert_eq!(Value::Integer(3).truthy(), Some(true));
        assert_eq!(Value::String("x".into()).truthy(), Some(true));
    }

    #[test]
    fn test_list_comparison() {
        let a = Value::List(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::List(vec![Value::Integer(1), Value::Integer(3)]);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(a, Value::List(vec![Value::Real(1.0), Value::Integer(2)]));
    }
}

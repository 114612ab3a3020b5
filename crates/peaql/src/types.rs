//! Type tags and the overload-matching relations.

use chrono::{Datelike, Timelike};

use crate::value::Value;

/// A type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DType {
    /// The type of NULL.
    Null,
    /// 64-bit integers. A refinement of [`DType::Real`]: integer arguments
    /// match Real parameters at lower priority.
    Integer,
    /// IEEE-754 doubles.
    Real,
    /// Fixed-scale decimals.
    Decimal,
    /// Booleans.
    Boolean,
    /// UTF-8 strings.
    String,
    /// Instants.
    DateTime,
    /// Calendar intervals.
    Interval,
    /// Homogeneous lists.
    List(Box<DType>),
    /// Any value; generic parameter slot.
    Object,
    /// The `*` marker (`count(*)`).
    Asterisk,
    /// Overload ellipsis: the wrapped type repeats for trailing arguments.
    Vararg(Box<DType>),
}

impl DType {
    /// SQL-style lowercase name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Decimal => "numeric",
            Self::Boolean => "boolean",
            Self::String => "text",
            Self::DateTime => "timestamp",
            Self::Interval => "interval",
            Self::List(_) => "list",
            Self::Object => "any",
            Self::Asterisk => "*",
            Self::Vararg(_) => "...",
        }
    }

    /// Whether this parameter type accepts an argument of type `arg`.
    ///
    /// `Object` accepts everything; `Null` arguments are accepted anywhere
    /// (they short-circuit at runtime); `Integer` arguments match `Real`
    /// parameters through the extends relation.
    #[must_use]
    pub fn accepts(&self, arg: &Self) -> bool {
        if matches!(arg, Self::Null) {
            return !matches!(self, Self::Asterisk);
        }
        match (self, arg) {
            (Self::Object, Self::Asterisk) => false,
            (Self::Object, _) => true,
            (Self::Asterisk, Self::Asterisk) => true,
            (Self::Real, Self::Integer) => true,
            (Self::List(a), Self::List(b)) => a.accepts(b),
            (a, b) => a == b,
        }
    }

    /// Match cost for specificity ordering: exact 0, extension 1, generic 2.
    #[must_use]
    pub fn cost(&self, arg: &Self) -> u8 {
        if self == arg {
            return 0;
        }
        match self {
            Self::Object => 2,
            Self::List(a) => match arg {
                Self::List(b) => a.cost(b),
                _ => 2,
            },
            _ => 1,
        }
    }

    /// Whether values of this type order as numbers, which RANGE frames
    /// with offset bounds require.
    #[must_use]
    pub fn is_range_orderable(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Real | Self::Decimal | Self::DateTime | Self::Interval
        )
    }

    /// The type tag a value of this type classifies as, for checking
    /// invariant (iii): a value reported as a DType satisfies it.
    #[must_use]
    pub fn classifies(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            Self::Object => true,
            Self::List(elem) => match value {
                Value::List(items) | Value::Set(items) => {
                    items.iter().all(|item| elem.classifies(item))
                }
                _ => false,
            },
            Self::Real => matches!(value, Value::Real(_) | Value::Integer(_)),
            other => &value.dtype() == other,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A named sub-attribute of a structured type.
pub struct AttributeDef {
    /// The attribute name.
    pub name: &'static str,
    /// The attribute's type.
    pub dtype: DType,
    /// Reads the attribute from a value of the structured type.
    pub get: fn(&Value) -> Value,
}

macro_rules! datetime_attr {
    ($value:expr, $dt:ident => $body:expr) => {
        match $value {
            Value::DateTime($dt) => $body,
            _ => Value::Null,
        }
    };
}

fn dt_year(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(i64::from(dt.year())))
}

fn dt_month(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(i64::from(dt.month())))
}

fn dt_day(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(i64::from(dt.day())))
}

fn dt_hour(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(i64::from(dt.hour())))
}

fn dt_minute(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(i64::from(dt.minute())))
}

fn dt_second(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(i64::from(dt.second())))
}

fn dt_quarter(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(i64::from((dt.month() - 1) / 3 + 1)))
}

/// ISO weekday: Monday = 1 … Sunday = 7.
fn dt_weekday(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(i64::from(dt.weekday().number_from_monday())))
}

/// `YYYYMM` as an integer, e.g. 202403.
fn dt_yearmonth(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(i64::from(dt.year()) * 100 + i64::from(dt.month())))
}

fn dt_epoch(v: &Value) -> Value {
    datetime_attr!(v, dt => Value::Integer(dt.timestamp_millis()))
}

/// The wildcard field list of the DateTime structure.
static DATETIME_ATTRIBUTES: &[AttributeDef] = &[
    AttributeDef { name: "year", dtype: DType::Integer, get: dt_year },
    AttributeDef { name: "month", dtype: DType::Integer, get: dt_month },
    AttributeDef { name: "day", dtype: DType::Integer, get: dt_day },
    AttributeDef { name: "hour", dtype: DType::Integer, get: dt_hour },
    AttributeDef { name: "minute", dtype: DType::Integer, get: dt_minute },
    AttributeDef { name: "second", dtype: DType::Integer, get: dt_second },
    AttributeDef { name: "quarter", dtype: DType::Integer, get: dt_quarter },
    AttributeDef { name: "weekday", dtype: DType::Integer, get: dt_weekday },
    AttributeDef { name: "yearmonth", dtype: DType::Integer, get: dt_yearmonth },
    AttributeDef { name: "epoch", dtype: DType::Integer, get: dt_epoch },
];

/// Returns the named sub-attributes of a structured type; empty for
/// unstructured types.
#[must_use]
pub fn attributes(dtype: &DType) -> &'static [AttributeDef] {
    match dtype {
        DType::DateTime => DATETIME_ATTRIBUTES,
        _ => &[],
    }
}

/// Looks up one attribute of a structured type.
#[must_use]
pub fn attribute(dtype: &DType, name: &str) -> Option<&'static AttributeDef> {
    attributes(dtype).iter().find(|attr| attr.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::parse_datetime;

    #[test]
    fn test_integer_extends_real() {
        assert!(DType::Real.accepts(&DType::Integer));
        assert!(!DType::Integer.accepts(&DType::Real));
        assert_eq!(DType::Real.cost(&DType::Integer), 1);
        assert_eq!(DType::Integer.cost(&DType::Integer), 0);
    }

    #[test]
    fn test_object_is_least_specific() {
        assert!(DType::Object.accepts(&DType::String));
        assert_eq!(DType::Object.cost(&DType::String), 2);
    }

    #[test]
    fn test_null_matches_everything_but_asterisk() {
        assert!(DType::String.accepts(&DType::Null));
        assert!(DType::List(Box::new(DType::Integer)).accepts(&DType::Null));
        assert!(!DType::Asterisk.accepts(&DType::Null));
    }

    #[test]
    fn test_range_orderable() {
        assert!(DType::Integer.is_range_orderable());
        assert!(DType::DateTime.is_range_orderable());
        assert!(!DType::String.is_range_orderable());
        assert_eq!(DType::String.name(), "text");
    }

    #[test]
    fn test_datetime_attributes() {
        let dt = Value::DateTime(parse_datetime("2024-03-15 10:30:45").unwrap());
        let year = attribute(&DType::DateTime, "year").unwrap();
        assert_eq!((year.get)(&dt), Value::Integer(2024));
        let quarter = attribute(&DType::DateTime, "quarter").unwrap();
        assert_eq!((quarter.get)(&dt), Value::Integer(1));
        let weekday = attribute(&DType::DateTime, "weekday").unwrap();
        assert_eq!((weekday.get)(&dt), Value::Integer(5)); // Friday

        assert!(attribute(&DType::String, "year").is_none());
    }

    #[test]
    fn test_classifies() {
        assert!(DType::Real.classifies(&Value::Integer(1)));
        assert!(DType::String.classifies(&Value::Null));
        assert!(!DType::String.classifies(&Value::Integer(1)));
        assert!(DType::List(Box::new(DType::Integer))
            .classifies(&Value::List(vec![Value::Integer(1), Value::Null])));
    }
}

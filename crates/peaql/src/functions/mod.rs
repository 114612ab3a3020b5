//! The built-in library: scalar operators, casts, string and temporal
//! functions, aggregators and window functions.

pub(crate) mod aggregate;
mod scalar;
mod strings;
mod temporal;

use crate::registry::Registry;
use crate::types::DType;
use crate::value::Value;

/// Builds the process-wide registry.
pub(crate) fn install() -> Registry {
    let mut reg = Registry::default();
    scalar::install(&mut reg);
    strings::install(&mut reg);
    temporal::install(&mut reg);
    aggregate::install(&mut reg);
    reg
}

/// Applies the registered cast for `dtype` to a value; Null when no cast
/// applies or the cast fails.
#[must_use]
pub(crate) fn cast_to(value: &Value, dtype: &DType) -> Value {
    use scalar::{
        cast_boolean, cast_datetime, cast_decimal, cast_integer, cast_interval, cast_real,
        cast_string,
    };
    let args = std::slice::from_ref(value);
    match dtype {
        DType::Integer => cast_integer(args),
        DType::Real => cast_real(args),
        DType::Decimal => cast_decimal(args),
        DType::Boolean => cast_boolean(args),
        DType::String => cast_string(args),
        DType::DateTime => cast_datetime(args),
        DType::Interval => cast_interval(args),
        DType::Object => value.clone(),
        _ => Value::Null,
    }
}

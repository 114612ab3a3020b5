//! String built-ins and the regex/LIKE operators.

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;

use super::scalar::{function, sig};
use crate::registry::Registry;
use crate::types::DType;
use crate::value::Value;

fn compile_regex(pattern: &str, case_insensitive: bool) -> Option<Regex> {
    let pattern = if case_insensitive {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    Regex::new(&pattern).ok()
}

fn regex_test(args: &[Value], case_insensitive: bool, negated: bool, swapped: bool) -> Value {
    let (text, pattern) = if swapped {
        (&args[1], &args[0])
    } else {
        (&args[0], &args[1])
    };
    let (Value::String(text), Value::String(pattern)) = (text, pattern) else {
        return Value::Null;
    };
    compile_regex(pattern, case_insensitive)
        .map_or(Value::Null, |re| Value::Boolean(re.is_match(text) != negated))
}

fn re_match(args: &[Value]) -> Value {
    regex_test(args, false, false, false)
}

fn re_match_ci(args: &[Value]) -> Value {
    regex_test(args, true, false, false)
}

fn re_not_match(args: &[Value]) -> Value {
    regex_test(args, false, true, false)
}

fn re_not_match_ci(args: &[Value]) -> Value {
    regex_test(args, true, true, false)
}

/// `?~`: pattern on the left; `(?flags)` prefixes pass straight through.
fn re_match_swapped(args: &[Value]) -> Value {
    regex_test(args, false, false, true)
}

fn re_match_swapped_ci(args: &[Value]) -> Value {
    regex_test(args, true, false, true)
}

/// LIKE translated to an anchored regex: `%` → `.*`, `_` → `.`.
fn like(args: &[Value]) -> Value {
    let (Value::String(text), Value::String(pattern)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    let mut translated = String::with_capacity(pattern.len() + 2);
    translated.push('^');
    for c in pattern.chars() {
        match c {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated).map_or(Value::Null, |re| Value::Boolean(re.is_match(text)))
}

fn concat_pair(args: &[Value]) -> Value {
    Value::String(format!("{}{}", args[0], args[1]))
}

fn length(args: &[Value]) -> Value {
    match &args[0] {
        Value::String(s) => Value::Integer(s.chars().count() as i64),
        Value::List(items) | Value::Set(items) => Value::Integer(items.len() as i64),
        _ => Value::Null,
    }
}

fn upper(args: &[Value]) -> Value {
    match &args[0] {
        Value::String(s) => Value::String(s.to_uppercase()),
        _ => Value::Null,
    }
}

fn lower(args: &[Value]) -> Value {
    match &args[0] {
        Value::String(s) => Value::String(s.to_lowercase()),
        _ => Value::Null,
    }
}

/// `substr(s, start[, len])`, 1-based; negative start counts from the end.
fn substr(args: &[Value]) -> Value {
    let Value::String(s) = &args[0] else {
        return Value::Null;
    };
    let Some(start) = args[1].as_i64() else {
        return Value::Null;
    };
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let begin = if start > 0 {
        start - 1
    } else if start < 0 {
        (len + start).max(0)
    } else {
        0
    };
    let begin = begin.min(len) as usize;
    let take = match args.get(2) {
        Some(n) => match n.as_i64() {
            Some(n) if n >= 0 => n as usize,
            _ => return Value::Null,
        },
        None => chars.len(),
    };
    Value::String(chars[begin..].iter().take(take).collect())
}

fn concat_all(args: &[Value]) -> Value {
    let mut out = String::new();
    for arg in args {
        out.push_str(&arg.to_string());
    }
    Value::String(out)
}

/// `maxwidth(s, n)` truncates to at most `n` characters, marking the cut
/// with a trailing ellipsis when anything was dropped.
fn maxwidth(args: &[Value]) -> Value {
    let Value::String(s) = &args[0] else {
        return Value::Null;
    };
    let Some(width) = args[1].as_i64() else {
        return Value::Null;
    };
    let width = width.max(0) as usize;
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= width {
        return Value::String(s.clone());
    }
    let kept: String = chars.into_iter().take(width.saturating_sub(1)).collect();
    Value::String(format!("{kept}…"))
}

/// `splitcomp(s, sep, i)`: the 1-based `i`-th component of `s` split by
/// `sep`; out of range is Null.
fn splitcomp(args: &[Value]) -> Value {
    let (Value::String(s), Value::String(sep)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    let Some(index) = args[2].as_i64() else {
        return Value::Null;
    };
    if index < 1 || sep.is_empty() {
        return Value::Null;
    }
    s.split(sep.as_str())
        .nth((index - 1) as usize)
        .map_or(Value::Null, |part| Value::String(part.to_string()))
}

fn haystack(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::List(items) | Value::Set(items) => Some(items.clone()),
        Value::String(s) => Some(s.lines().map(|line| Value::String(line.into())).collect()),
        _ => None,
    }
}

/// `grep(xs, pattern)` keeps the elements matching the regex.
fn grep(args: &[Value]) -> Value {
    let Some(items) = haystack(&args[0]) else {
        return Value::Null;
    };
    let Value::String(pattern) = &args[1] else {
        return Value::Null;
    };
    let Some(re) = compile_regex(pattern, false) else {
        return Value::Null;
    };
    Value::List(
        items
            .into_iter()
            .filter(|item| matches!(item, Value::String(s) if re.is_match(s)))
            .collect(),
    )
}

/// `grepn(xs, pattern)` counts the elements matching the regex.
fn grepn(args: &[Value]) -> Value {
    match grep(args) {
        Value::List(items) => Value::Integer(items.len() as i64),
        _ => Value::Null,
    }
}

/// `subst(s, pattern, replacement)`: regex replace-all.
fn subst(args: &[Value]) -> Value {
    let (Value::String(s), Value::String(pattern), Value::String(replacement)) =
        (&args[0], &args[1], &args[2])
    else {
        return Value::Null;
    };
    compile_regex(pattern, false)
        .map_or(Value::Null, |re| Value::String(re.replace_all(s, replacement.as_str()).into_owned()))
}

/// `find_first(s, pattern)`: the first regex match, or Null.
fn find_first(args: &[Value]) -> Value {
    let (Value::String(s), Value::String(pattern)) = (&args[0], &args[1]) else {
        return Value::Null;
    };
    compile_regex(pattern, false).map_or(Value::Null, |re| {
        re.find(s)
            .map_or(Value::Null, |m| Value::String(m.as_str().to_string()))
    })
}

/// `joinstr(xs, sep)`.
fn joinstr(args: &[Value]) -> Value {
    let (Value::List(items) | Value::Set(items)) = &args[0] else {
        return Value::Null;
    };
    let Value::String(sep) = &args[1] else {
        return Value::Null;
    };
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    Value::String(parts.join(sep))
}

// ---------------------------------------------------------------------
// format / to_char
// ---------------------------------------------------------------------

/// printf-style formatting: `%[flags][width][.prec](d|f|s|x)` plus `%%`.
fn format_value(args: &[Value]) -> Value {
    let Value::String(template) = &args[0] else {
        return Value::Null;
    };
    let mut out = String::new();
    let mut values = args[1..].iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut left_align = false;
        let mut zero_pad = false;
        let mut plus_sign = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                '+' => plus_sign = true,
                _ => break,
            }
            chars.next();
        }

        let mut width = String::new();
        while chars.peek().is_some_and(char::is_ascii_digit) {
            width.push(chars.next().unwrap_or_default());
        }
        let width: usize = width.parse().unwrap_or(0);

        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while chars.peek().is_some_and(char::is_ascii_digit) {
                digits.push(chars.next().unwrap_or_default());
            }
            precision = digits.parse().ok();
        }

        let Some(conversion) = chars.next() else {
            return Value::Null;
        };
        let Some(value) = values.next() else {
            return Value::Null;
        };

        let rendered = match conversion {
            'd' => value.as_i64().map(|i| {
                if plus_sign && i >= 0 {
                    format!("+{i}")
                } else {
                    i.to_string()
                }
            }),
            'f' => value.as_f64().map(|f| {
                let precision = precision.unwrap_or(6);
                if plus_sign && f >= 0.0 {
                    format!("+{f:.precision$}")
                } else {
                    format!("{f:.precision$}")
                }
            }),
            'x' => value.as_i64().map(|i| format!("{i:x}")),
            's' => {
                let mut s = value.to_string();
                if let Some(precision) = precision {
                    s.truncate(precision);
                }
                Some(s)
            }
            _ => None,
        };
        let Some(rendered) = rendered else {
            return Value::Null;
        };

        if rendered.len() >= width {
            out.push_str(&rendered);
        } else if left_align {
            out.push_str(&format!("{rendered:<width$}"));
        } else if zero_pad && matches!(conversion, 'd' | 'f' | 'x') {
            let (sign, digits) = match rendered.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", rendered.as_str()),
            };
            let pad = width.saturating_sub(sign.len() + digits.len());
            out.push_str(sign);
            for _ in 0..pad {
                out.push('0');
            }
            out.push_str(digits);
        } else {
            out.push_str(&format!("{rendered:>width$}"));
        }
    }

    Value::String(out)
}

/// Translates PG-style datetime patterns (`YYYY-MM-DD HH24:MI:SS`) to
/// chrono's strftime.
pub(super) fn translate_datetime_pattern(pattern: &str) -> String {
    const TABLE: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("Mon", "%b"),
        ("Month", "%B"),
        ("DD", "%d"),
        ("Dy", "%a"),
        ("Day", "%A"),
        ("HH24", "%H"),
        ("HH12", "%I"),
        ("HH", "%H"),
        ("MI", "%M"),
        ("SS", "%S"),
        ("MS", "%3f"),
        ("AM", "%p"),
        ("PM", "%p"),
        ("TZ", "%:z"),
    ];
    let mut out = String::new();
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (from, to) in TABLE {
            if rest.starts_with(from) {
                out.push_str(to);
                rest = &rest[from.len()..];
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }
    out
}

/// Formats a number against a `9`/`0` digit mask with optional `,` and `.`.
fn format_number_mask(value: f64, mask: &str) -> String {
    let decimals = mask
        .split_once('.')
        .map_or(0, |(_, frac)| frac.chars().filter(|c| *c == '9' || *c == '0').count());
    let grouped = mask.contains(',');
    let negative = value < 0.0;
    let rendered = format!("{:.decimals$}", value.abs());
    let (int_part, frac_part) = match rendered.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (rendered, None),
    };
    let int_part = if grouped {
        let digits: Vec<char> = int_part.chars().collect();
        let mut grouped_digits = String::new();
        for (i, c) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped_digits.push(',');
            }
            grouped_digits.push(*c);
        }
        grouped_digits
    } else {
        int_part
    };
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&int_part);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(&frac);
    }
    out
}

/// `to_char(value, fmt)` over numbers, decimals, datetimes and intervals.
fn to_char(args: &[Value]) -> Value {
    let Value::String(pattern) = &args[1] else {
        return Value::Null;
    };
    match &args[0] {
        Value::DateTime(dt) => {
            let translated = translate_datetime_pattern(pattern);
            Value::String(dt.format(&translated).to_string())
        }
        Value::Interval(iv) => Value::String(iv.to_iso8601()),
        Value::Integer(_) | Value::Real(_) => args[0]
            .as_f64()
            .map_or(Value::Null, |f| Value::String(format_number_mask(f, pattern))),
        Value::Decimal(d) => d
            .to_f64()
            .map_or(Value::Null, |f| Value::String(format_number_mask(f, pattern))),
        _ => Value::Null,
    }
}

// ---------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------

fn pattern_op(reg: &mut Registry, name: &'static str, eval: fn(&[Value]) -> Value) {
    function(
        reg,
        name,
        true,
        vec![sig(&[DType::String, DType::String], DType::Boolean, eval)],
    );
}

pub(super) fn install(reg: &mut Registry) {
    pattern_op(reg, "~", re_match);
    pattern_op(reg, "~*", re_match_ci);
    pattern_op(reg, "!~", re_not_match);
    pattern_op(reg, "!~*", re_not_match_ci);
    pattern_op(reg, "?~", re_match_swapped);
    pattern_op(reg, "?~*", re_match_swapped_ci);
    pattern_op(reg, "like", like);

    function(
        reg,
        "||",
        true,
        vec![sig(&[DType::Object, DType::Object], DType::String, concat_pair)],
    );

    function(
        reg,
        "length",
        true,
        vec![
            sig(&[DType::String], DType::Integer, length),
            sig(&[DType::List(Box::new(DType::Object))], DType::Integer, length),
        ],
    );
    function(reg, "upper", true, vec![sig(&[DType::String], DType::String, upper)]);
    function(reg, "lower", true, vec![sig(&[DType::String], DType::String, lower)]);
    function(
        reg,
        "substr",
        true,
        vec![
            sig(&[DType::String, DType::Integer], DType::String, substr),
            sig(&[DType::String, DType::Integer, DType::Integer], DType::String, substr),
        ],
    );
    function(
        reg,
        "concat",
        true,
        vec![sig(
            &[DType::Object, DType::Vararg(Box::new(DType::Object))],
            DType::String,
            concat_all,
        )],
    );
    function(
        reg,
        "maxwidth",
        true,
        vec![sig(&[DType::String, DType::Integer], DType::String, maxwidth)],
    );
    function(
        reg,
        "splitcomp",
        true,
        vec![sig(
            &[DType::String, DType::String, DType::Integer],
            DType::String,
            splitcomp,
        )],
    );
    function(
        reg,
        "grep",
        true,
        vec![sig(
            &[DType::Object, DType::String],
            DType::List(Box::new(DType::String)),
            grep,
        )],
    );
    function(
        reg,
        "grepn",
        true,
        vec![sig(&[DType::Object, DType::String], DType::Integer, grepn)],
    );
    function(
        reg,
        "subst",
        true,
        vec![sig(
            &[DType::String, DType::String, DType::String],
            DType::String,
            subst,
        )],
    );
    function(
        reg,
        "findfirst",
        true,
        vec![sig(&[DType::String, DType::String], DType::String, find_first)],
    );
    function(
        reg,
        "joinstr",
        true,
        vec![sig(
            &[DType::List(Box::new(DType::Object)), DType::String],
            DType::String,
            joinstr,
        )],
    );
    function(
        reg,
        "format",
        true,
        vec![sig(
            &[DType::String, DType::Vararg(Box::new(DType::Object))],
            DType::String,
            format_value,
        )],
    );
    function(
        reg,
        "to_char",
        true,
        vec![sig(&[DType::Object, DType::String], DType::String, to_char)],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_operators() {
        let s = |v: &str| Value::String(v.into());
        assert_eq!(re_match(&[s("hello"), s("^h")]), Value::Boolean(true));
        assert_eq!(re_match(&[s("hello"), s("^H")]), Value::Boolean(false));
        assert_eq!(re_match_ci(&[s("hello"), s("^H")]), Value::Boolean(true));
        assert_eq!(re_not_match(&[s("hello"), s("^H")]), Value::Boolean(true));
        // ?~ takes the pattern on the left and honors embedded flags.
        assert_eq!(re_match_swapped(&[s("(?i)^H"), s("hello")]), Value::Boolean(true));
        assert_eq!(re_match(&[s("x"), s("(")]), Value::Null);
    }

    #[test]
    fn test_like() {
        let s = |v: &str| Value::String(v.into());
        assert_eq!(like(&[s("peter"), s("pe%")]), Value::Boolean(true));
        assert_eq!(like(&[s("peter"), s("p_ter")]), Value::Boolean(true));
        assert_eq!(like(&[s("peter"), s("pan")]), Value::Boolean(false));
        assert_eq!(like(&[s("a.c"), s("a.c")]), Value::Boolean(true));
        assert_eq!(like(&[s("abc"), s("a.c")]), Value::Boolean(false));
    }

    #[test]
    fn test_substr() {
        let s = |v: &str| Value::String(v.into());
        assert_eq!(substr(&[s("playlist"), Value::Integer(1), Value::Integer(4)]), s("play"));
        assert_eq!(substr(&[s("playlist"), Value::Integer(5)]), s("list"));
        assert_eq!(substr(&[s("playlist"), Value::Integer(-4)]), s("list"));
    }

    #[test]
    fn test_splitcomp_and_joinstr() {
        let s = |v: &str| Value::String(v.into());
        assert_eq!(splitcomp(&[s("a.b.c"), s("."), Value::Integer(2)]), s("b"));
        assert_eq!(splitcomp(&[s("a.b.c"), s("."), Value::Integer(9)]), Value::Null);
        let list = Value::List(vec![s("a"), s("b")]);
        assert_eq!(joinstr(&[list, s("-")]), s("a-b"));
    }

    #[test]
    fn test_grep_family() {
        let list = Value::List(vec![
            Value::String("apple".into()),
            Value::String("pear".into()),
            Value::String("plum".into()),
        ]);
        assert_eq!(
            grep(&[list.clone(), Value::String("^p".into())]),
            Value::List(vec![Value::String("pear".into()), Value::String("plum".into())])
        );
        assert_eq!(grepn(&[list, Value::String("^p".into())]), Value::Integer(2));
    }

    #[test]
    fn test_format() {
        let s = |v: &str| Value::String(v.into());
        assert_eq!(
            format_value(&[s("%s has %d items (%.1f%%)"), s("cart"), Value::Integer(3), Value::Real(12.35)]),
            s("cart has 3 items (12.3%)")
        );
        assert_eq!(format_value(&[s("%05d"), Value::Integer(-42)]), s("-0042"));
        assert_eq!(format_value(&[s("%-4d|"), Value::Integer(7)]), s("7    |"));
        assert_eq!(format_value(&[s("%x"), Value::Integer(255)]), s("ff"));
    }

    #[test]
    fn test_to_char() {
        let dt = Value::DateTime(crate::value::parse_datetime("2024-03-15 10:05:00").unwrap());
        assert_eq!(
            to_char(&[dt, Value::String("YYYY-MM-DD HH24:MI".into())]),
            Value::String("2024-03-15 10:05".into())
        );
        assert_eq!(
            to_char(&[Value::Real(1234.5), Value::String("9,999.99".into())]),
            Value::String("1,234.50".into())
        );
    }

    #[test]
    fn test_maxwidth() {
        let s = |v: &str| Value::String(v.into());
        assert_eq!(maxwidth(&[s("short"), Value::Integer(10)]), s("short"));
        assert_eq!(maxwidth(&[s("elongated"), Value::Integer(5)]), s("elon…"));
    }
}

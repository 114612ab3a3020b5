//! End-to-end query tests: expressions, filters, ordering, placeholders,
//! subqueries, CTEs and compound queries.

use std::collections::HashMap;

use peaql::{Context, Error, Output, Parameters, Value};

fn rows(ctx: &mut Context, sql: &str) -> Vec<Vec<Value>> {
    match ctx.query(sql).expect("query succeeds") {
        Output::Rows(result) => result.rows,
        Output::Count(count) => panic!("expected rows, got count {count}"),
    }
}

fn scalar(ctx: &mut Context, sql: &str) -> Value {
    let rows = rows(ctx, sql);
    assert_eq!(rows.len(), 1, "expected a single row");
    assert_eq!(rows[0].len(), 1, "expected a single column");
    rows[0][0].clone()
}

fn fixture() -> Context {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE t1(a STRING, b INTEGER)").unwrap();
    ctx.query("INSERT INTO t1 VALUES('peter', 1), ('pan', 2), ('wendy', 3), ('hook', NULL)")
        .unwrap();
    ctx
}

#[test]
fn test_constant_select_yields_one_row() {
    let mut ctx = Context::new();
    assert_eq!(scalar(&mut ctx, "SELECT 1 + 2 * 3"), Value::Integer(7));
    assert_eq!(scalar(&mut ctx, "SELECT 'a' || 'b'"), Value::String("ab".into()));
}

#[test]
fn test_division_semantics() {
    let mut ctx = Context::new();
    assert_eq!(scalar(&mut ctx, "SELECT 7 / 2"), Value::Integer(3));
    assert_eq!(scalar(&mut ctx, "SELECT 7.0 / 2"), Value::Real(3.5));
    assert_eq!(scalar(&mut ctx, "SELECT 7 / 0"), Value::Null);
    assert_eq!(scalar(&mut ctx, "SELECT safediv(7, 0)"), Value::Integer(0));
}

#[test]
fn test_three_valued_logic() {
    let mut ctx = Context::new();
    assert_eq!(scalar(&mut ctx, "SELECT NULL = 1"), Value::Null);
    assert_eq!(scalar(&mut ctx, "SELECT NULL AND FALSE"), Value::Boolean(false));
    assert_eq!(scalar(&mut ctx, "SELECT NULL OR TRUE"), Value::Boolean(true));
    assert_eq!(scalar(&mut ctx, "SELECT NULL OR FALSE"), Value::Null);
    assert_eq!(scalar(&mut ctx, "SELECT NOT NULL"), Value::Null);
    assert_eq!(scalar(&mut ctx, "SELECT NULL IS NULL"), Value::Boolean(true));
    assert_eq!(scalar(&mut ctx, "SELECT 1 IS NOT NULL"), Value::Boolean(true));
    assert_eq!(scalar(&mut ctx, "SELECT NULL BETWEEN 1 AND 2"), Value::Null);
}

#[test]
fn test_null_filter_drops_rows() {
    let mut ctx = fixture();
    // b IS NULL for hook; the comparison is unknown, so the row drops.
    let result = rows(&mut ctx, "SELECT a FROM t1 WHERE b > 0");
    assert_eq!(result.len(), 3);
}

#[test]
fn test_where_order_limit_offset() {
    let mut ctx = fixture();
    let result = rows(
        &mut ctx,
        "SELECT a FROM t1 WHERE b IS NOT NULL ORDER BY b DESC LIMIT 2 OFFSET 1",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::String("pan".into())],
            vec![Value::String("peter".into())],
        ]
    );
}

#[test]
fn test_order_by_nulls_default_last_for_asc() {
    let mut ctx = fixture();
    let result = rows(&mut ctx, "SELECT a FROM t1 ORDER BY b");
    assert_eq!(result.last().unwrap()[0], Value::String("hook".into()));
    let result = rows(&mut ctx, "SELECT a FROM t1 ORDER BY b NULLS FIRST");
    assert_eq!(result[0][0], Value::String("hook".into()));
}

#[test]
fn test_distinct_preserves_first_seen_order() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE v(x INTEGER)").unwrap();
    ctx.query("INSERT INTO v VALUES(3),(1),(3),(2),(1)").unwrap();
    let result = rows(&mut ctx, "SELECT DISTINCT x FROM v");
    assert_eq!(
        result,
        vec![
            vec![Value::Integer(3)],
            vec![Value::Integer(1)],
            vec![Value::Integer(2)],
        ]
    );
}

#[test]
fn test_in_and_between() {
    let mut ctx = fixture();
    assert_eq!(
        scalar(&mut ctx, "SELECT count(*) FROM t1 WHERE b IN (1, 3)"),
        Value::Integer(2)
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT count(*) FROM t1 WHERE b NOT IN (1, 3)"),
        Value::Integer(1)
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT count(*) FROM t1 WHERE b BETWEEN 2 AND 3"),
        Value::Integer(2)
    );
    assert_eq!(scalar(&mut ctx, "SELECT 2 IN [1, 2, 3]"), Value::Boolean(true));
}

#[test]
fn test_case_expressions() {
    let mut ctx = fixture();
    let result = rows(
        &mut ctx,
        "SELECT CASE WHEN b >= 2 THEN 'big' WHEN b = 1 THEN 'small' ELSE 'none' END \
         FROM t1 ORDER BY a",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::String("none".into())],
            vec![Value::String("big".into())],
            vec![Value::String("small".into())],
            vec![Value::String("big".into())],
        ]
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT CASE 2 WHEN 1 THEN 'one' WHEN 2 THEN 'two' END"),
        Value::String("two".into())
    );
}

#[test]
fn test_coalesce_and_nullif() {
    let mut ctx = Context::new();
    assert_eq!(scalar(&mut ctx, "SELECT coalesce(NULL, NULL, 3)"), Value::Integer(3));
    assert_eq!(scalar(&mut ctx, "SELECT nullif(1, 1)"), Value::Null);
}

#[test]
fn test_regex_operators() {
    let mut ctx = fixture();
    assert_eq!(
        scalar(&mut ctx, "SELECT count(*) FROM t1 WHERE a ~ '^p'"),
        Value::Integer(2)
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT count(*) FROM t1 WHERE a ~* '^P'"),
        Value::Integer(2)
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT count(*) FROM t1 WHERE a !~ '^p'"),
        Value::Integer(2)
    );
    // ?~ puts the pattern on the left.
    assert_eq!(scalar(&mut ctx, "SELECT '(?i)^P' ?~ 'peter'"), Value::Boolean(true));
}

#[test]
fn test_method_call_and_cast_sugar() {
    let mut ctx = Context::new();
    assert_eq!(
        scalar(&mut ctx, "SELECT (1.0 / 3).toFixed(2)"),
        Value::String("0.33".into())
    );
    // toFixed dispatches on decimals too.
    assert_eq!(
        scalar(&mut ctx, "SELECT (1::numeric / 3).toFixed(2)"),
        Value::String("0.33".into())
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT '2.5'::numeric.toFixed(3)"),
        Value::String("2.500".into())
    );
    assert_eq!(scalar(&mut ctx, "SELECT '42'::integer"), Value::Integer(42));
    assert_eq!(scalar(&mut ctx, "SELECT 42::string"), Value::String("42".into()));
}

#[test]
fn test_datetime_attributes() {
    let mut ctx = Context::new();
    assert_eq!(
        scalar(&mut ctx, "SELECT '2024-03-15'::datetime.year"),
        Value::Integer(2024)
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT year('2024-03-15'::datetime)"),
        Value::Integer(2024)
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT ('2024-03-15'::datetime + 31).month"),
        Value::Integer(4)
    );
}

#[test]
fn test_subscripts() {
    let mut ctx = Context::new();
    assert_eq!(scalar(&mut ctx, "SELECT [10, 20, 30][2]"), Value::Integer(20));
    assert_eq!(scalar(&mut ctx, "SELECT [10][9]"), Value::Null);
    assert_eq!(
        scalar(&mut ctx, "SELECT '2024-03-15'::datetime['year']"),
        Value::Integer(2024)
    );
}

#[test]
fn test_positional_placeholders() {
    let mut ctx = fixture();
    let output = ctx
        .execute(
            "SELECT a FROM t1 WHERE b = ?",
            &Parameters::Positional(vec![Value::Integer(2)]),
        )
        .unwrap();
    let Output::Rows(result) = output else { panic!() };
    assert_eq!(result.rows, vec![vec![Value::String("pan".into())]]);
}

#[test]
fn test_named_placeholders() {
    let mut ctx = fixture();
    let mut params = HashMap::new();
    params.insert("min".to_string(), Value::Integer(2));
    let output = ctx
        .execute(
            "SELECT count(*) FROM t1 WHERE b >= :min",
            &Parameters::Named(params),
        )
        .unwrap();
    let Output::Rows(result) = output else { panic!() };
    assert_eq!(result.rows, vec![vec![Value::Integer(2)]]);
}

#[test]
fn test_mixed_placeholders_are_a_programming_error() {
    let mut ctx = fixture();
    let err = ctx
        .execute(
            "SELECT a FROM t1 WHERE b = ? AND a = :name",
            &Parameters::Positional(vec![Value::Integer(1)]),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Programming(_)), "got {err}");
}

#[test]
fn test_positional_arity_mismatch_is_fatal() {
    let mut ctx = fixture();
    let err = ctx
        .execute(
            "SELECT a FROM t1 WHERE b = ?",
            &Parameters::Positional(vec![Value::Integer(1), Value::Integer(2)]),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Programming(_)), "got {err}");
}

#[test]
fn test_unknown_column_is_a_compile_error() {
    let mut ctx = fixture();
    let err = ctx.query("SELECT nope FROM t1").unwrap_err();
    assert!(matches!(err, Error::Compile { .. }), "got {err}");
    assert!(err.to_string().contains("nope"));
}

#[test]
fn test_unknown_signature_is_not_supported() {
    let mut ctx = fixture();
    let err = ctx.query("SELECT upper(b) FROM t1").unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)), "got {err}");
    assert!(err.to_string().contains("upper(integer)"));
}

#[test]
fn test_scalar_subquery() {
    let mut ctx = fixture();
    assert_eq!(
        scalar(&mut ctx, "SELECT (SELECT max(b) FROM t1)"),
        Value::Integer(3)
    );
}

#[test]
fn test_scalar_subquery_cardinality_error() {
    let mut ctx = fixture();
    let err = ctx.query("SELECT (SELECT b FROM t1)").unwrap_err();
    assert!(matches!(err, Error::Data(_)), "got {err}");
}

#[test]
fn test_in_subquery_and_exists() {
    let mut ctx = fixture();
    assert_eq!(
        scalar(
            &mut ctx,
            "SELECT count(*) FROM t1 WHERE b IN (SELECT b FROM t1 WHERE b >= 2)",
        ),
        Value::Integer(2)
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT EXISTS (SELECT 1 FROM t1 WHERE b = 3)"),
        Value::Boolean(true)
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT EXISTS (SELECT 1 FROM t1 WHERE b = 99)"),
        Value::Boolean(false)
    );
}

#[test]
fn test_correlated_subquery() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE emp(dept STRING, salary INTEGER)").unwrap();
    ctx.query(
        "INSERT INTO emp VALUES('eng', 100), ('eng', 120), ('ops', 80), ('ops', 95)",
    )
    .unwrap();
    let result = rows(
        &mut ctx,
        "SELECT dept, salary FROM emp \
         WHERE salary = (SELECT max(e2.salary) FROM emp e2 WHERE e2.dept = emp.dept) \
         ORDER BY dept",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::String("eng".into()), Value::Integer(120)],
            vec![Value::String("ops".into()), Value::Integer(95)],
        ]
    );
}

#[test]
fn test_cte() {
    let mut ctx = fixture();
    let result = rows(
        &mut ctx,
        "WITH big AS (SELECT a, b FROM t1 WHERE b >= 2) SELECT a FROM big ORDER BY b",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::String("pan".into())],
            vec![Value::String("wendy".into())],
        ]
    );
}

#[test]
fn test_compound_queries() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE n(x INTEGER)").unwrap();
    ctx.query("INSERT INTO n VALUES(1),(2),(3)").unwrap();

    let union_all = rows(
        &mut ctx,
        "SELECT x FROM n UNION ALL SELECT x FROM n WHERE x > 2 ORDER BY 1",
    );
    assert_eq!(union_all.len(), 4);

    let union = rows(&mut ctx, "SELECT x FROM n UNION SELECT x FROM n ORDER BY 1");
    assert_eq!(union.len(), 3);

    let intersect = rows(
        &mut ctx,
        "SELECT x FROM n INTERSECT SELECT x FROM n WHERE x >= 2 ORDER BY 1",
    );
    assert_eq!(
        intersect,
        vec![vec![Value::Integer(2)], vec![Value::Integer(3)]]
    );

    let except = rows(
        &mut ctx,
        "SELECT x FROM n EXCEPT SELECT x FROM n WHERE x >= 2 ORDER BY 1",
    );
    assert_eq!(except, vec![vec![Value::Integer(1)]]);
}

#[test]
fn test_identifier_quoting_setting() {
    let mut ctx = fixture();
    // Backtick mode: double quotes read as string literals.
    let output = ctx
        .query("SET identifier_quoting = backtick; SELECT \"x\" FROM t1 LIMIT 1")
        .unwrap();
    let Output::Rows(result) = output else { panic!() };
    assert_eq!(result.rows, vec![vec![Value::String("x".into())]]);
    // Auto mode: an unresolvable quoted name falls back to a literal.
    assert_eq!(
        scalar(&mut ctx, "SELECT \"mystery\" FROM t1 LIMIT 1"),
        Value::String("mystery".into())
    );
    // ...while a resolvable quoted name stays a column.
    assert_eq!(
        scalar(&mut ctx, "SELECT \"b\" FROM t1 WHERE a = 'pan'"),
        Value::Integer(2)
    );
}

#[test]
fn test_default_table() {
    let mut ctx = fixture().with_default_table("t1");
    assert_eq!(scalar(&mut ctx, "SELECT count(*)"), Value::Integer(4));
}

#[test]
fn test_parse_errors_surface_together() {
    let ctx = Context::new();
    let prepared = ctx.prepare("SELEC 1; SELECT FROM; SELECT 3");
    assert_eq!(prepared.errors.len(), 2);
    let mut ctx = ctx;
    let err = ctx
        .compile(&prepared, &Parameters::None, peaql::CompileOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Parse(errors) if errors.len() == 2));
}

#[test]
fn test_string_functions() {
    let mut ctx = Context::new();
    assert_eq!(scalar(&mut ctx, "SELECT length('peaql')"), Value::Integer(5));
    assert_eq!(
        scalar(&mut ctx, "SELECT upper('peaql')"),
        Value::String("PEAQL".into())
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT substr('playlist', 5)"),
        Value::String("list".into())
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT splitcomp('a.b.c', '.', 2)"),
        Value::String("b".into())
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT format('%s=%05.1f', 'pi', 3.14159)"),
        Value::String("pi=003.1".into())
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT to_char(1234.5, '9,999.99')"),
        Value::String("1,234.50".into())
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT joinstr(['a', 'b', 'c'], '-')"),
        Value::String("a-b-c".into())
    );
}

#[test]
fn test_temporal_functions() {
    let mut ctx = Context::new();
    assert_eq!(
        scalar(&mut ctx, "SELECT date_diff('2024-01-01'::datetime, '2024-02-01'::datetime)"),
        Value::Integer(31)
    );
    assert_eq!(
        scalar(
            &mut ctx,
            "SELECT date_trunc('month', '2024-03-15'::datetime)::string",
        ),
        Value::String("2024-03-01T00:00:00+00:00".into())
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT '2024-01-31'::datetime + '1 month'::interval"),
        scalar(&mut ctx, "SELECT '2024-02-29'::datetime")
    );
}

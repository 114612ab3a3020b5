//! Grouping and aggregation tests, including the sales fixture scenarios.

use peaql::{Context, Error, Output, Value};
use rust_decimal::Decimal;

fn rows(ctx: &mut Context, sql: &str) -> Vec<Vec<Value>> {
    match ctx.query(sql).expect("query succeeds") {
        Output::Rows(result) => result.rows,
        Output::Count(count) => panic!("expected rows, got count {count}"),
    }
}

fn scalar(ctx: &mut Context, sql: &str) -> Value {
    let rows = rows(ctx, sql);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), 1);
    rows[0][0].clone()
}

/// The 8-row sales fixture: (region, product, amount).
fn sales() -> Context {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE sales(region STRING, product STRING, amount INTEGER)")
        .unwrap();
    ctx.query(
        "INSERT INTO sales VALUES \
         ('N', 'A', 100), ('N', 'B', 200), ('S', 'A', 150), ('S', 'C', 300), \
         ('E', 'B', 250), ('E', 'C', 100), ('W', 'A', 50), ('W', 'B', 300)",
    )
    .unwrap();
    ctx
}

#[test]
fn test_count_distinct_product_is_three() {
    let mut ctx = sales();
    assert_eq!(
        scalar(&mut ctx, "SELECT count(distinct product) FROM sales"),
        Value::Integer(3)
    );
}

#[test]
fn test_group_by_with_having() {
    let mut ctx = sales();
    let result = rows(
        &mut ctx,
        "SELECT region, sum(amount) FROM sales GROUP BY region HAVING sum(amount) > 300 ORDER BY 2 DESC",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::String("S".into()), Value::Integer(450)],
            vec![Value::String("E".into()), Value::Integer(350)],
            vec![Value::String("W".into()), Value::Integer(350)],
        ]
    );
}

#[test]
fn test_group_by_index_and_expression_reuse() {
    let mut ctx = sales();
    let by_index = rows(&mut ctx, "SELECT product, count(*) FROM sales GROUP BY 1 ORDER BY 1");
    let by_expr = rows(
        &mut ctx,
        "SELECT product, count(*) FROM sales GROUP BY product ORDER BY product",
    );
    assert_eq!(by_index, by_expr);
    assert_eq!(
        by_index,
        vec![
            vec![Value::String("A".into()), Value::Integer(3)],
            vec![Value::String("B".into()), Value::Integer(3)],
            vec![Value::String("C".into()), Value::Integer(2)],
        ]
    );
}

#[test]
fn test_implicit_group_by_adds_missing_keys() {
    let mut ctx = sales();
    // Strict SQL would reject `region` here; the engine's implicit mode
    // silently adds it as a key.
    let result = rows(&mut ctx, "SELECT region, count(*) FROM sales ORDER BY 1");
    assert_eq!(result.len(), 4);
}

#[test]
fn test_strict_group_by_mode_errors() {
    let mut ctx = sales();
    let prepared = ctx.prepare("SELECT region, count(*) FROM sales");
    let options = peaql::CompileOptions {
        implicit_group_by: false,
    };
    let err = ctx
        .compile(&prepared, &peaql::Parameters::None, options)
        .unwrap_err();
    assert!(matches!(err, Error::Compile { .. }), "got {err}");
    assert!(err.to_string().contains("GROUP BY"), "got {err}");
}

#[test]
fn test_empty_input_aggregates() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE empty(x INTEGER)").unwrap();
    // One row of initialized-then-finalized aggregates.
    let result = rows(&mut ctx, "SELECT count(*), sum(x), avg(x), min(x), max(x) FROM empty");
    assert_eq!(
        result,
        vec![vec![
            Value::Integer(0),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]]
    );
    // With group keys and no input there are no groups at all.
    let grouped = rows(&mut ctx, "SELECT x, count(*) FROM empty GROUP BY x");
    assert!(grouped.is_empty());
}

#[test]
fn test_count_star_counts_nulls_count_column_skips() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE v(x INTEGER)").unwrap();
    ctx.query("INSERT INTO v VALUES(1),(NULL),(2),(NULL)").unwrap();
    let result = rows(&mut ctx, "SELECT count(*), count(x) FROM v");
    assert_eq!(result, vec![vec![Value::Integer(4), Value::Integer(2)]]);
}

#[test]
fn test_avg_accumulates_decimal() {
    let mut ctx = sales();
    assert_eq!(
        scalar(&mut ctx, "SELECT avg(amount) FROM sales"),
        Value::Decimal(Decimal::new(18125, 2))
    );
}

#[test]
fn test_sum_keeps_numeric_flavor() {
    let mut ctx = sales();
    assert_eq!(scalar(&mut ctx, "SELECT sum(amount) FROM sales"), Value::Integer(1450));
    assert_eq!(
        scalar(&mut ctx, "SELECT sum(amount * 1.0) FROM sales"),
        Value::Real(1450.0)
    );
}

#[test]
fn test_filter_clause() {
    let mut ctx = sales();
    let result = rows(
        &mut ctx,
        "SELECT count(*) FILTER (WHERE amount >= 200), count(*) FROM sales",
    );
    assert_eq!(result, vec![vec![Value::Integer(4), Value::Integer(8)]]);
}

#[test]
fn test_group_concat_and_array_agg() {
    let mut ctx = sales();
    assert_eq!(
        scalar(
            &mut ctx,
            "SELECT group_concat(product, ',') FROM sales WHERE region = 'N'",
        ),
        Value::String("A,B".into())
    );
    assert_eq!(
        scalar(&mut ctx, "SELECT array_agg(amount) FROM sales WHERE region = 'W'"),
        Value::List(vec![Value::Integer(50), Value::Integer(300)])
    );
    assert_eq!(
        scalar(
            &mut ctx,
            "SELECT group_concat(DISTINCT product, '/') FROM sales WHERE product != 'C' ORDER BY 1",
        ),
        Value::String("A/B".into())
    );
}

#[test]
fn test_first_and_last() {
    let mut ctx = sales();
    let result = rows(
        &mut ctx,
        "SELECT region, first(amount), last(amount) FROM sales GROUP BY region ORDER BY region",
    );
    assert_eq!(
        result[0],
        vec![Value::String("E".into()), Value::Integer(250), Value::Integer(100)]
    );
}

#[test]
fn test_mixed_target_re_resolves() {
    let mut ctx = sales();
    let result = rows(
        &mut ctx,
        "SELECT region, sum(amount) / count(*) FROM sales GROUP BY region ORDER BY region",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::String("E".into()), Value::Integer(175)],
            vec![Value::String("N".into()), Value::Integer(150)],
            vec![Value::String("S".into()), Value::Integer(225)],
            vec![Value::String("W".into()), Value::Integer(175)],
        ]
    );
}

#[test]
fn test_grouping_invariant_under_row_permutation() {
    let mut forward = sales();
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE sales(region STRING, product STRING, amount INTEGER)")
        .unwrap();
    ctx.query(
        "INSERT INTO sales VALUES \
         ('W', 'B', 300), ('W', 'A', 50), ('E', 'C', 100), ('E', 'B', 250), \
         ('S', 'C', 300), ('S', 'A', 150), ('N', 'B', 200), ('N', 'A', 100)",
    )
    .unwrap();

    let sql = "SELECT region, sum(amount), count(*) FROM sales GROUP BY region ORDER BY region";
    assert_eq!(rows(&mut forward, sql), rows(&mut ctx, sql));
}

#[test]
fn test_aggregates_rejected_in_where() {
    let mut ctx = sales();
    let err = ctx.query("SELECT region FROM sales WHERE sum(amount) > 10").unwrap_err();
    assert!(err.to_string().contains("WHERE"), "got {err}");
}

#[test]
fn test_nested_aggregates_rejected() {
    let mut ctx = sales();
    let err = ctx.query("SELECT sum(count(*)) FROM sales").unwrap_err();
    assert!(err.to_string().contains("nested"), "got {err}");
}

#[test]
fn test_distinct_on_scalar_function_rejected() {
    let mut ctx = sales();
    let err = ctx.query("SELECT upper(DISTINCT region) FROM sales").unwrap_err();
    assert!(err.to_string().contains("DISTINCT"), "got {err}");
}

#[test]
fn test_pivot() {
    let mut ctx = sales();
    let Output::Rows(result) = ctx
        .query("SELECT region, product, sum(amount) FROM sales GROUP BY 1, 2 PIVOT BY region, product")
        .unwrap()
    else {
        panic!()
    };
    assert_eq!(result.column_names(), vec!["region", "A", "B", "C"]);
    assert_eq!(
        result.rows,
        vec![
            vec![Value::String("E".into()), Value::Null, Value::Integer(250), Value::Integer(100)],
            vec![Value::String("N".into()), Value::Integer(100), Value::Integer(200), Value::Null],
            vec![Value::String("S".into()), Value::Integer(150), Value::Null, Value::Integer(300)],
            vec![Value::String("W".into()), Value::Integer(50), Value::Integer(300), Value::Null],
        ]
    );
}

#[test]
fn test_pivot_requires_group_key_axis() {
    let mut ctx = sales();
    let err = ctx
        .query("SELECT region, sum(amount) FROM sales GROUP BY region PIVOT BY region, sum(amount)")
        .unwrap_err();
    assert!(err.to_string().contains("PIVOT"), "got {err}");
}

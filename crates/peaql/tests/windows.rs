//! Window function tests: frames, EXCLUDE modes, named windows and the
//! window-only function library.

use peaql::{Context, Output, Value};

fn rows(ctx: &mut Context, sql: &str) -> Vec<Vec<Value>> {
    match ctx.query(sql).expect("query succeeds") {
        Output::Rows(result) => result.rows,
        Output::Count(count) => panic!("expected rows, got count {count}"),
    }
}

/// t1(a, b, c) as in the group_concat frame scenario.
fn t1() -> Context {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE t1(a INTEGER, b STRING, c STRING)").unwrap();
    ctx.query(
        "INSERT INTO t1 VALUES \
         (1, 'A', 'one'), (2, 'B', 'two'), (3, 'C', 'three'), (4, 'D', 'one'), \
         (5, 'E', 'two'), (6, 'F', 'three'), (7, 'G', 'one')",
    )
    .unwrap();
    ctx
}

fn s(text: &str) -> Value {
    Value::String(text.into())
}

#[test]
fn test_group_concat_over_range_following_frame() {
    let mut ctx = t1();
    let result = rows(
        &mut ctx,
        "SELECT c, a, b, group_concat(b, '.') OVER ( \
           PARTITION BY c ORDER BY a RANGE BETWEEN CURRENT ROW AND UNBOUNDED FOLLOWING \
         ) FROM t1 ORDER BY c, a",
    );
    assert_eq!(
        result,
        vec![
            vec![s("one"), Value::Integer(1), s("A"), s("A.D.G")],
            vec![s("one"), Value::Integer(4), s("D"), s("D.G")],
            vec![s("one"), Value::Integer(7), s("G"), s("G")],
            vec![s("three"), Value::Integer(3), s("C"), s("C.F")],
            vec![s("three"), Value::Integer(6), s("F"), s("F")],
            vec![s("two"), Value::Integer(2), s("B"), s("B.E")],
            vec![s("two"), Value::Integer(5), s("E"), s("E")],
        ]
    );
}

#[test]
fn test_named_window_binding() {
    let mut ctx = t1();
    let named = rows(
        &mut ctx,
        "SELECT a, sum(a) OVER w FROM t1 WINDOW w AS (PARTITION BY c ORDER BY a) ORDER BY a",
    );
    let inline = rows(
        &mut ctx,
        "SELECT a, sum(a) OVER (PARTITION BY c ORDER BY a) FROM t1 ORDER BY a",
    );
    assert_eq!(named, inline);
}

#[test]
fn test_named_window_reference_overrides() {
    let mut ctx = t1();
    // The reference site overrides only the fields it provides: the frame
    // here, the partitioning from the base.
    let result = rows(
        &mut ctx,
        "SELECT a, count(*) OVER (w ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) \
         FROM t1 WINDOW w AS (PARTITION BY c ORDER BY a) ORDER BY a",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::Integer(1), Value::Integer(1)],
            vec![Value::Integer(2), Value::Integer(1)],
            vec![Value::Integer(3), Value::Integer(1)],
            vec![Value::Integer(4), Value::Integer(2)],
            vec![Value::Integer(5), Value::Integer(2)],
            vec![Value::Integer(6), Value::Integer(2)],
            vec![Value::Integer(7), Value::Integer(3)],
        ]
    );
}

#[test]
fn test_cumulative_rows_frame_is_non_decreasing() {
    let mut ctx = t1();
    let result = rows(
        &mut ctx,
        "SELECT sum(a) OVER (ORDER BY a ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) \
         FROM t1 ORDER BY a",
    );
    let sums: Vec<i64> = result
        .iter()
        .map(|row| match &row[0] {
            Value::Integer(v) => *v,
            other => panic!("expected integer, got {other:?}"),
        })
        .collect();
    assert_eq!(sums, vec![1, 3, 6, 10, 15, 21, 28]);
    assert!(sums.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_rows_frame_with_bounds() {
    let mut ctx = t1();
    let result = rows(
        &mut ctx,
        "SELECT sum(a) OVER (ORDER BY a ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING) \
         FROM t1 ORDER BY a",
    );
    let sums: Vec<Value> = result.into_iter().map(|mut row| row.remove(0)).collect();
    assert_eq!(
        sums,
        vec![
            Value::Integer(3),
            Value::Integer(6),
            Value::Integer(9),
            Value::Integer(12),
            Value::Integer(15),
            Value::Integer(18),
            Value::Integer(13),
        ]
    );
}

#[test]
fn test_groups_frame() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE g(k INTEGER, v INTEGER)").unwrap();
    ctx.query("INSERT INTO g VALUES(1, 10), (1, 20), (2, 30), (3, 40)").unwrap();
    // GROUPS buckets by the ORDER BY value; 1 PRECEDING spans the previous
    // peer group as a whole.
    let result = rows(
        &mut ctx,
        "SELECT k, sum(v) OVER (ORDER BY k GROUPS BETWEEN 1 PRECEDING AND CURRENT ROW) \
         FROM g ORDER BY k, v",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::Integer(1), Value::Integer(30)],
            vec![Value::Integer(1), Value::Integer(30)],
            vec![Value::Integer(2), Value::Integer(60)],
            vec![Value::Integer(3), Value::Integer(70)],
        ]
    );
}

#[test]
fn test_exclude_modes() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE e(k INTEGER, v INTEGER)").unwrap();
    ctx.query("INSERT INTO e VALUES(1, 10), (1, 20), (2, 30)").unwrap();

    let current = rows(
        &mut ctx,
        "SELECT v, sum(v) OVER (ORDER BY k ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING EXCLUDE CURRENT ROW) \
         FROM e ORDER BY v",
    );
    assert_eq!(
        current,
        vec![
            vec![Value::Integer(10), Value::Integer(50)],
            vec![Value::Integer(20), Value::Integer(40)],
            vec![Value::Integer(30), Value::Integer(30)],
        ]
    );

    // EXCLUDE GROUP drops the whole peer class of the current row.
    let group = rows(
        &mut ctx,
        "SELECT v, sum(v) OVER (ORDER BY k ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING EXCLUDE GROUP) \
         FROM e ORDER BY v",
    );
    assert_eq!(
        group,
        vec![
            vec![Value::Integer(10), Value::Integer(30)],
            vec![Value::Integer(20), Value::Integer(30)],
            vec![Value::Integer(30), Value::Integer(30)],
        ]
    );

    // EXCLUDE TIES keeps the current row but drops its peers.
    let ties = rows(
        &mut ctx,
        "SELECT v, sum(v) OVER (ORDER BY k ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING EXCLUDE TIES) \
         FROM e ORDER BY v",
    );
    assert_eq!(
        ties,
        vec![
            vec![Value::Integer(10), Value::Integer(40)],
            vec![Value::Integer(20), Value::Integer(50)],
            vec![Value::Integer(30), Value::Integer(60)],
        ]
    );
}

#[test]
fn test_range_offsets_on_numeric_column() {
    let mut ctx = t1();
    let result = rows(
        &mut ctx,
        "SELECT a, sum(a) OVER (ORDER BY a RANGE BETWEEN 2 PRECEDING AND CURRENT ROW) \
         FROM t1 ORDER BY a",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::Integer(1), Value::Integer(1)],
            vec![Value::Integer(2), Value::Integer(3)],
            vec![Value::Integer(3), Value::Integer(6)],
            vec![Value::Integer(4), Value::Integer(9)],
            vec![Value::Integer(5), Value::Integer(12)],
            vec![Value::Integer(6), Value::Integer(15)],
            vec![Value::Integer(7), Value::Integer(18)],
        ]
    );
}

#[test]
fn test_range_offset_on_text_column_is_rejected() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE sales(product STRING, revenue INTEGER)").unwrap();
    let err = ctx
        .query(
            "SELECT SUM(revenue) OVER (ORDER BY product RANGE BETWEEN 10 PRECEDING AND CURRENT ROW) FROM sales",
        )
        .unwrap_err();
    assert!(
        err.to_string().contains(
            "RANGE with offset PRECEDING/FOLLOWING is not supported for column type text"
        ),
        "got {err}"
    );
}

#[test]
fn test_row_number_rank_dense_rank() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE r(v INTEGER)").unwrap();
    ctx.query("INSERT INTO r VALUES(10),(20),(20),(30)").unwrap();
    let result = rows(
        &mut ctx,
        "SELECT v, row_number() OVER (ORDER BY v), rank() OVER (ORDER BY v), \
                dense_rank() OVER (ORDER BY v) FROM r ORDER BY v, 2",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::Integer(10), Value::Integer(1), Value::Integer(1), Value::Integer(1)],
            vec![Value::Integer(20), Value::Integer(2), Value::Integer(2), Value::Integer(2)],
            vec![Value::Integer(20), Value::Integer(3), Value::Integer(2), Value::Integer(2)],
            vec![Value::Integer(30), Value::Integer(4), Value::Integer(4), Value::Integer(3)],
        ]
    );
}

#[test]
fn test_lead_lag_first_last_nth() {
    let mut ctx = t1();
    let result = rows(
        &mut ctx,
        "SELECT a, lag(b) OVER (ORDER BY a), lead(b, 1, '-') OVER (ORDER BY a), \
                first_value(b) OVER (ORDER BY a), nth_value(b, 2) OVER (ORDER BY a ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING) \
         FROM t1 WHERE a <= 3 ORDER BY a",
    );
    assert_eq!(
        result,
        vec![
            vec![Value::Integer(1), Value::Null, s("B"), s("A"), s("B")],
            vec![Value::Integer(2), s("A"), s("C"), s("A"), s("B")],
            vec![Value::Integer(3), s("B"), s("-"), s("A"), s("B")],
        ]
    );
}

#[test]
fn test_window_function_requires_over() {
    let mut ctx = t1();
    let err = ctx.query("SELECT row_number() FROM t1").unwrap_err();
    assert!(err.to_string().contains("OVER"), "got {err}");
}

#[test]
fn test_window_over_grouped_rows() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE s(region STRING, amount INTEGER)").unwrap();
    ctx.query("INSERT INTO s VALUES('N', 100), ('N', 200), ('S', 150), ('S', 300)")
        .unwrap();
    // The window runs after grouping, over the per-region sums.
    let result = rows(
        &mut ctx,
        "SELECT region, sum(amount), rank() OVER (ORDER BY sum(amount) DESC) \
         FROM s GROUP BY region ORDER BY region",
    );
    assert_eq!(
        result,
        vec![
            vec![s("N"), Value::Integer(300), Value::Integer(2)],
            vec![s("S"), Value::Integer(450), Value::Integer(1)],
        ]
    );
}

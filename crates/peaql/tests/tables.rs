//! Table model tests: type inference, the persisted JSON form and its
//! round-trip law, and `create_database`.

use peaql::{create_database, Context, DType, Output, Table, Value};

fn rows(ctx: &mut Context, sql: &str) -> Vec<Vec<Value>> {
    match ctx.query(sql).expect("query succeeds") {
        Output::Rows(result) => result.rows,
        Output::Count(count) => panic!("expected rows, got count {count}"),
    }
}

#[test]
fn test_create_database_infers_types() {
    let mut ctx = create_database(&serde_json::json!({
        "people": [
            {"name": "ada", "age": 36},
            {"name": "alan", "age": 41},
        ],
    }))
    .unwrap();
    let table = ctx.table("people").unwrap();
    assert_eq!(table.column("name").unwrap().dtype, DType::String);
    assert_eq!(table.column("age").unwrap().dtype, DType::Integer);

    let result = rows(&mut ctx, "SELECT name FROM people WHERE age > 40");
    assert_eq!(result, vec![vec![Value::String("alan".into())]]);
}

#[test]
fn test_to_json_shape() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE t1(a STRING, b INTEGER, CHECK(b > 100))").unwrap();
    ctx.query("INSERT INTO t1 VALUES('x', 200)").unwrap();
    let model = ctx.table("t1").unwrap().to_json();

    assert_eq!(model["name"], "t1");
    assert_eq!(model["columns"][0]["name"], "a");
    assert_eq!(model["columns"][0]["type"], "text");
    assert_eq!(model["columns"][1]["type"], "integer");
    assert_eq!(model["constraints"][0]["name"], "t1_b_check");
    assert!(model["constraints"][0]["expr"].as_str().unwrap().contains("b > 100"));
    assert_eq!(model["data"][0]["a"], "x");
    assert_eq!(model["data"][0]["b"], 200);
}

#[test]
fn test_json_round_trip_law() {
    let mut ctx = Context::new();
    ctx.query(
        "CREATE TABLE t1(a STRING NOT NULL, b INTEGER, stamp TIMESTAMP, CHECK(b > 100))",
    )
    .unwrap();
    ctx.query("INSERT INTO t1 VALUES('x', 200, '2024-03-15'), ('y', 300, NULL)")
        .unwrap();

    let model = ctx.table("t1").unwrap().to_json();
    let reloaded = Table::from_json(&model).unwrap();
    assert_eq!(reloaded.to_json(), model);
}

#[test]
fn test_from_json_validates_rows() {
    let model = serde_json::json!({
        "name": "t1",
        "columns": [{"name": "a", "type": "string"}, {"name": "b", "type": "integer"}],
        "constraints": [{"name": "t1_b_check", "column": "b", "expr": "(b > 100)"}],
        "data": [{"a": "x", "b": 55}],
    });
    let err = Table::from_json(&model).unwrap_err();
    assert!(err.to_string().contains("t1_b_check"), "got {err}");
}

#[test]
fn test_from_json_coerces_typed_columns() {
    let model = serde_json::json!({
        "name": "t",
        "columns": [{"name": "stamp", "type": "timestamp"}, {"name": "n", "type": "integer"}],
        "constraints": [],
        "data": [{"stamp": "2024-03-15T00:00:00+00:00", "n": "7"}],
    });
    let table = Table::from_json(&model).unwrap();
    let mut ctx = Context::new().with_tables([table]);
    let result = rows(&mut ctx, "SELECT stamp.year, n FROM t");
    assert_eq!(result, vec![vec![Value::Integer(2024), Value::Integer(7)]]);
}

#[test]
fn test_reloaded_constraints_enforce() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE t1(a STRING, b INTEGER, CHECK(b > 100))").unwrap();
    let model = ctx.table("t1").unwrap().to_json();

    let reloaded = Table::from_json(&model).unwrap();
    let mut ctx2 = Context::new().with_tables([reloaded]);
    let err = ctx2.query("INSERT INTO t1 VALUES('a', 55)").unwrap_err();
    assert!(err.to_string().contains("t1_b_check"), "got {err}");
}

#[test]
fn test_wildcard_column_subset() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE wide(a INTEGER, b INTEGER, secret STRING)").unwrap();
    ctx.query("INSERT INTO wide VALUES(1, 2, 'hidden')").unwrap();
    let mut narrowed = ctx.table("wide").unwrap().clone();
    narrowed.set_wildcard(vec!["a".into(), "b".into()]);
    let mut ctx = Context::new().with_tables([narrowed]);

    let Output::Rows(result) = ctx.query("SELECT * FROM wide").unwrap() else {
        panic!()
    };
    assert_eq!(result.column_names(), vec!["a", "b"]);
    // Explicit selection still reaches non-wildcard columns.
    let result = rows(&mut ctx, "SELECT secret FROM wide");
    assert_eq!(result, vec![vec![Value::String("hidden".into())]]);
}

#[test]
fn test_table_from_records() {
    use peaql::Record;
    let records = vec![
        Record::from_pairs([
            ("x".to_string(), Value::Integer(1)),
            ("y".to_string(), Value::Null),
        ]),
        Record::from_pairs([
            ("x".to_string(), Value::Integer(2)),
            ("y".to_string(), Value::String("b".into())),
        ]),
    ];
    let table = Table::from_records("pairs", records);
    assert_eq!(table.column("x").unwrap().dtype, DType::Integer);
    assert_eq!(table.column("y").unwrap().dtype, DType::String);

    let mut ctx = Context::new().with_tables([table]);
    let result = rows(&mut ctx, "SELECT x FROM pairs WHERE y IS NULL");
    assert_eq!(result, vec![vec![Value::Integer(1)]]);
}

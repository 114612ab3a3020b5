//! Statement-level parser coverage.

use peaql_parser::ast::{
    Expr, FrameBound, FrameExclusion, FrameUnits, InsertSource, JoinType, Literal, SetOp,
    Statement, TableRef,
};
use peaql_parser::{IdentifierQuoting, Parser, ParserOptions};

fn parse(input: &str) -> Statement {
    let script = Parser::new(input).parse_script();
    assert!(script.errors.is_empty(), "parse errors: {:?}", script.errors);
    assert_eq!(script.statements.len(), 1);
    script.statements.into_iter().next().expect("one statement")
}

fn parse_query(input: &str) -> peaql_parser::ast::Query {
    match parse(input) {
        Statement::Query(query) => *query,
        other => panic!("expected query, got {other:?}"),
    }
}

#[test]
fn test_full_select_clause_order() {
    let query = parse_query(
        "SELECT region, sum(amount) AS total \
         FROM sales \
         WHERE amount > 0 \
         GROUP BY region \
         HAVING sum(amount) > 100 \
         WINDOW w AS (PARTITION BY region) \
         PIVOT BY region, total \
         ORDER BY total DESC \
         LIMIT 10 OFFSET 5",
    );
    assert_eq!(query.select.targets.len(), 2);
    assert!(query.select.where_clause.is_some());
    assert_eq!(query.select.group_by.len(), 1);
    assert!(query.select.having.is_some());
    assert_eq!(query.select.windows.len(), 1);
    assert_eq!(query.select.pivot_by.len(), 2);
    assert_eq!(query.order_by.len(), 1);
    assert!(query.limit.is_some());
    assert!(query.offset.is_some());
}

#[test]
fn test_multi_join_chain() {
    let query = parse_query(
        "SELECT playlist.name, count(pt.track_id) FROM playlist \
           JOIN playlist_track pt ON pt.playlist_id = playlist.playlist_id \
           JOIN track ON track.track_id = pt.track_id \
         GROUP BY 1 ORDER BY 2 DESC LIMIT 10",
    );
    assert_eq!(query.select.joins.len(), 2);
    let TableRef::Named { name, alias, .. } = &query.select.joins[0].table else {
        panic!()
    };
    assert_eq!(name, "playlist_track");
    assert_eq!(alias.as_deref(), Some("pt"));
    assert_eq!(query.select.joins[0].join_type, JoinType::Inner);
}

#[test]
fn test_window_frame_variants() {
    for (text, units) in [
        ("ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING", FrameUnits::Rows),
        ("GROUPS BETWEEN 1 PRECEDING AND CURRENT ROW", FrameUnits::Groups),
        (
            "RANGE BETWEEN CURRENT ROW AND UNBOUNDED FOLLOWING",
            FrameUnits::Range,
        ),
    ] {
        let query = parse_query(&format!(
            "SELECT sum(x) OVER (PARTITION BY c ORDER BY a {text}) FROM t"
        ));
        let Expr::Function(call) = &query.select.targets[0].expr else {
            panic!()
        };
        let frame = call.over.as_ref().unwrap().frame.as_ref().unwrap();
        assert_eq!(frame.units, units);
    }
}

#[test]
fn test_frame_exclusions() {
    for (text, exclude) in [
        ("EXCLUDE NO OTHERS", FrameExclusion::NoOthers),
        ("EXCLUDE CURRENT ROW", FrameExclusion::CurrentRow),
        ("EXCLUDE GROUP", FrameExclusion::Group),
        ("EXCLUDE TIES", FrameExclusion::Ties),
    ] {
        let query = parse_query(&format!(
            "SELECT sum(x) OVER (ORDER BY a ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW {text}) FROM t"
        ));
        let Expr::Function(call) = &query.select.targets[0].expr else {
            panic!()
        };
        let frame = call.over.as_ref().unwrap().frame.as_ref().unwrap();
        assert_eq!(frame.exclude, exclude);
        assert!(matches!(frame.start, FrameBound::UnboundedPreceding));
        assert!(matches!(frame.end, FrameBound::CurrentRow));
    }
}

#[test]
fn test_single_bound_frame_defaults_to_current_row() {
    let query = parse_query("SELECT sum(x) OVER (ORDER BY a ROWS 2 PRECEDING) FROM t");
    let Expr::Function(call) = &query.select.targets[0].expr else {
        panic!()
    };
    let frame = call.over.as_ref().unwrap().frame.as_ref().unwrap();
    assert!(matches!(frame.start, FrameBound::Preceding(_)));
    assert!(matches!(frame.end, FrameBound::CurrentRow));
}

#[test]
fn test_compound_chain() {
    let query = parse_query(
        "SELECT a FROM t UNION SELECT a FROM u INTERSECT SELECT a FROM v EXCEPT ALL SELECT a FROM w",
    );
    assert_eq!(query.compounds.len(), 3);
    assert_eq!(query.compounds[0].op, SetOp::Union);
    assert!(!query.compounds[0].all);
    assert_eq!(query.compounds[1].op, SetOp::Intersect);
    assert_eq!(query.compounds[2].op, SetOp::Except);
    assert!(query.compounds[2].all);
}

#[test]
fn test_insert_select_source() {
    let Statement::Insert(insert) = parse("INSERT INTO dst(x) SELECT x FROM src") else {
        panic!()
    };
    assert!(matches!(insert.source, InsertSource::Query(_)));
}

#[test]
fn test_create_table_full_constraints() {
    let Statement::CreateTable(create) = parse(
        "CREATE TABLE orders( \
           id INTEGER PRIMARY KEY, \
           customer STRING NOT NULL, \
           total NUMERIC DEFAULT 0 CHECK(total >= 0), \
           CONSTRAINT orders_unique UNIQUE (id, customer), \
           FOREIGN KEY (customer) REFERENCES customers (name))",
    ) else {
        panic!()
    };
    assert_eq!(create.columns.len(), 3);
    assert!(create.columns[0].primary_key);
    assert!(create.columns[1].not_null);
    assert!(create.columns[2].default.is_some());
    assert_eq!(create.constraints.len(), 2);
    assert_eq!(create.constraints[0].name(), Some("orders_unique"));
}

#[test]
fn test_statement_script_with_set() {
    let script = Parser::new(
        "SET identifier_quoting = bracket; \
         CREATE TABLE t(a STRING); \
         INSERT INTO t VALUES('x'); \
         SELECT * FROM t",
    )
    .parse_script();
    assert!(script.errors.is_empty());
    assert_eq!(script.statements.len(), 4);
    assert!(matches!(script.statements[0], Statement::Set { .. }));
}

#[test]
fn test_error_recovery_continues_at_semicolon() {
    let script = Parser::new("SELECT 1; BOGUS things; SELECT 2; ALSO bad").parse_script();
    assert_eq!(script.statements.len(), 2);
    assert_eq!(script.errors.len(), 2);
    assert!(script.errors[0].span.start > 0);
}

#[test]
fn test_quoting_modes_affect_expression_position_only() {
    let options = ParserOptions {
        quoting: IdentifierQuoting::Quoted,
    };
    // Table names in FROM accept any delimited style regardless of mode.
    let script = Parser::with_options("SELECT `lit` FROM `my table`", options).parse_script();
    assert!(script.errors.is_empty());
    let Statement::Query(query) = &script.statements[0] else {
        panic!()
    };
    assert!(matches!(
        query.select.targets[0].expr,
        Expr::Literal(Literal::String(_))
    ));
    let TableRef::Named { name, .. } = query.select.from.as_ref().unwrap() else {
        panic!()
    };
    assert_eq!(name, "my table");
}

#[test]
fn test_returning_wildcards() {
    let Statement::Delete(delete) = parse("DELETE FROM t WHERE a = 1 RETURNING *") else {
        panic!()
    };
    assert_eq!(delete.returning.len(), 1);
    assert!(matches!(delete.returning[0].expr, Expr::Wildcard { table: None }));
}

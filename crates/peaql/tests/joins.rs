//! Join tests: all join kinds, USING, the equi-join hash path and the
//! Chinook playlist/track aggregation scenario.

use peaql::{Context, Output, Record, Table, Value};

fn rows(ctx: &mut Context, sql: &str) -> Vec<Vec<Value>> {
    match ctx.query(sql).expect("query succeeds") {
        Output::Rows(result) => result.rows,
        Output::Count(count) => panic!("expected rows, got count {count}"),
    }
}

fn sorted(mut rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    rows.sort_by_key(|row| format!("{row:?}"));
    rows
}

fn music_fixture() -> Context {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE playlist(playlist_id INTEGER, name STRING)").unwrap();
    ctx.query("CREATE TABLE track(track_id INTEGER, title STRING)").unwrap();
    ctx.query("CREATE TABLE playlist_track(playlist_id INTEGER, track_id INTEGER)")
        .unwrap();
    ctx.query(
        "INSERT INTO playlist VALUES(1, 'Music'), (2, '90''s Music'), (3, 'TV Shows'), (4, 'Classical'), (5, 'Empty')",
    )
    .unwrap();
    ctx.query(
        "INSERT INTO track VALUES(10, 'Alpha'), (11, 'Beta'), (12, 'Gamma'), (13, 'Delta'), (14, 'Epsilon')",
    )
    .unwrap();
    // Music: 5 tracks, 90's Music: 3, TV Shows: 2, Classical: 1.
    ctx.query(
        "INSERT INTO playlist_track VALUES \
         (1, 10), (1, 11), (1, 12), (1, 13), (1, 14), \
         (2, 10), (2, 11), (2, 12), \
         (3, 13), (3, 14), \
         (4, 10)",
    )
    .unwrap();
    ctx
}

/// Per-playlist track counts of the reference Chinook run: "Music" 6580,
/// "90's Music" 1477, "TV Shows" 426, "Classical" 75, and so on down to the
/// empty "Audiobooks" playlist that the inner join drops.
const CHINOOK_PLAYLISTS: &[(i64, &str, i64)] = &[
    (1, "Music", 6580),
    (2, "90's Music", 1477),
    (3, "TV Shows", 426),
    (4, "Classical", 75),
    (5, "Brazilian Music", 39),
    (6, "Heavy Metal Classic", 26),
    (7, "Classical 101", 25),
    (8, "Grunge", 15),
    (9, "Music Videos", 2),
    (10, "On-The-Go", 1),
    (11, "Audiobooks", 0),
];

/// A Chinook-shaped catalog with abbreviated row content but the reference
/// run's literal per-playlist cardinalities.
fn chinook_fixture() -> Context {
    let playlists: Vec<Record> = CHINOOK_PLAYLISTS
        .iter()
        .map(|(id, name, _)| {
            Record::from_pairs([
                ("playlist_id".to_string(), Value::Integer(*id)),
                ("name".to_string(), Value::String((*name).to_string())),
            ])
        })
        .collect();

    let track_count = CHINOOK_PLAYLISTS
        .iter()
        .map(|(_, _, count)| *count)
        .max()
        .unwrap_or(0);
    let tracks: Vec<Record> = (1..=track_count)
        .map(|id| {
            Record::from_pairs([
                ("track_id".to_string(), Value::Integer(id)),
                ("title".to_string(), Value::String(format!("Track {id}"))),
            ])
        })
        .collect();

    let mut mapping = Vec::new();
    for (id, _, count) in CHINOOK_PLAYLISTS {
        for track_id in 1..=*count {
            mapping.push(Record::from_pairs([
                ("playlist_id".to_string(), Value::Integer(*id)),
                ("track_id".to_string(), Value::Integer(track_id)),
            ]));
        }
    }

    Context::new().with_tables([
        Table::from_records("playlist", playlists),
        Table::from_records("track", tracks),
        Table::from_records("playlist_track", mapping),
    ])
}

#[test]
fn test_aggregated_join_order_limit() {
    let mut ctx = chinook_fixture();
    let result = rows(
        &mut ctx,
        "SELECT playlist.name, count(pt.track_id) FROM playlist \
           JOIN playlist_track pt ON pt.playlist_id = playlist.playlist_id \
           JOIN track ON track.track_id = pt.track_id \
         GROUP BY 1 ORDER BY 2 DESC LIMIT 10",
    );
    let expected: Vec<Vec<Value>> = CHINOOK_PLAYLISTS
        .iter()
        .filter(|(_, _, count)| *count > 0)
        .map(|(_, name, count)| {
            vec![Value::String((*name).to_string()), Value::Integer(*count)]
        })
        .collect();
    assert_eq!(result.len(), 10);
    assert_eq!(result, expected);
    assert_eq!(
        result[0],
        vec![Value::String("Music".into()), Value::Integer(6580)]
    );
    assert_eq!(
        result[1],
        vec![Value::String("90's Music".into()), Value::Integer(1477)]
    );
    assert_eq!(
        result[2],
        vec![Value::String("TV Shows".into()), Value::Integer(426)]
    );
    assert_eq!(
        result[3],
        vec![Value::String("Classical".into()), Value::Integer(75)]
    );
}

#[test]
fn test_inner_join_drops_unmatched() {
    let mut ctx = music_fixture();
    let result = rows(
        &mut ctx,
        "SELECT count(*) FROM playlist JOIN playlist_track pt ON pt.playlist_id = playlist.playlist_id",
    );
    assert_eq!(result, vec![vec![Value::Integer(11)]]);
}

#[test]
fn test_left_join_null_extends() {
    let mut ctx = music_fixture();
    let result = rows(
        &mut ctx,
        "SELECT playlist.name, pt.track_id FROM playlist \
           LEFT JOIN playlist_track pt ON pt.playlist_id = playlist.playlist_id \
         WHERE pt.track_id IS NULL",
    );
    assert_eq!(result, vec![vec![Value::String("Empty".into()), Value::Null]]);
}

#[test]
fn test_anti_join() {
    let mut ctx = music_fixture();
    let result = rows(
        &mut ctx,
        "SELECT name FROM playlist ANTI JOIN playlist_track pt ON pt.playlist_id = playlist.playlist_id",
    );
    assert_eq!(result, vec![vec![Value::String("Empty".into())]]);
}

#[test]
fn test_right_and_full_joins() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE l(id INTEGER, v STRING)").unwrap();
    ctx.query("CREATE TABLE r(id INTEGER, w STRING)").unwrap();
    ctx.query("INSERT INTO l VALUES(1, 'a'), (2, 'b')").unwrap();
    ctx.query("INSERT INTO r VALUES(2, 'x'), (3, 'y')").unwrap();

    let right = rows(
        &mut ctx,
        "SELECT l.v, r.w FROM l RIGHT JOIN r ON l.id = r.id",
    );
    assert_eq!(
        sorted(right),
        sorted(vec![
            vec![Value::String("b".into()), Value::String("x".into())],
            vec![Value::Null, Value::String("y".into())],
        ])
    );

    let full = rows(&mut ctx, "SELECT l.v, r.w FROM l FULL JOIN r ON l.id = r.id");
    assert_eq!(
        sorted(full),
        sorted(vec![
            vec![Value::String("a".into()), Value::Null],
            vec![Value::String("b".into()), Value::String("x".into())],
            vec![Value::Null, Value::String("y".into())],
        ])
    );
}

#[test]
fn test_cross_join_and_comma_relations() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE a(x INTEGER)").unwrap();
    ctx.query("CREATE TABLE b(y INTEGER)").unwrap();
    ctx.query("INSERT INTO a VALUES(1),(2)").unwrap();
    ctx.query("INSERT INTO b VALUES(10),(20),(30)").unwrap();

    let cross = rows(&mut ctx, "SELECT x, y FROM a CROSS JOIN b");
    assert_eq!(cross.len(), 6);
    let comma = rows(&mut ctx, "SELECT x, y FROM a, b WHERE y = 20");
    assert_eq!(comma.len(), 2);
    // CROSS JOIN with an ON condition behaves like INNER JOIN.
    let filtered = rows(&mut ctx, "SELECT x, y FROM a CROSS JOIN b ON y = x * 10");
    assert_eq!(
        sorted(filtered),
        sorted(vec![
            vec![Value::Integer(1), Value::Integer(10)],
            vec![Value::Integer(2), Value::Integer(20)],
        ])
    );
}

#[test]
fn test_using_rewrites_to_equalities() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE l(id INTEGER, v STRING)").unwrap();
    ctx.query("CREATE TABLE r(id INTEGER, w STRING)").unwrap();
    ctx.query("INSERT INTO l VALUES(1, 'a'), (2, 'b')").unwrap();
    ctx.query("INSERT INTO r VALUES(2, 'x')").unwrap();
    let result = rows(&mut ctx, "SELECT l.v, r.w FROM l JOIN r USING (id)");
    assert_eq!(
        result,
        vec![vec![Value::String("b".into()), Value::String("x".into())]]
    );
}

#[test]
fn test_hash_and_nested_loop_joins_agree() {
    let mut ctx = music_fixture();
    // A clean conjunction of column equalities takes the hash path; adding
    // arithmetic on one side forces the nested loop. Row bags must match.
    let hash = rows(
        &mut ctx,
        "SELECT playlist.name, pt.track_id FROM playlist \
           JOIN playlist_track pt ON pt.playlist_id = playlist.playlist_id",
    );
    let nested = rows(
        &mut ctx,
        "SELECT playlist.name, pt.track_id FROM playlist \
           JOIN playlist_track pt ON pt.playlist_id = playlist.playlist_id + 0",
    );
    assert_eq!(sorted(hash), sorted(nested));
}

#[test]
fn test_join_null_keys_never_match() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE l(id INTEGER)").unwrap();
    ctx.query("CREATE TABLE r(id INTEGER)").unwrap();
    ctx.query("INSERT INTO l VALUES(1),(NULL)").unwrap();
    ctx.query("INSERT INTO r VALUES(1),(NULL)").unwrap();
    let result = rows(&mut ctx, "SELECT count(*) FROM l JOIN r ON l.id = r.id");
    assert_eq!(result, vec![vec![Value::Integer(1)]]);
}

#[test]
fn test_subquery_in_from_requires_alias() {
    let mut ctx = music_fixture();
    assert!(ctx.query("SELECT * FROM (SELECT name FROM playlist)").is_err());
    let result = rows(
        &mut ctx,
        "SELECT p.name FROM (SELECT name FROM playlist WHERE playlist_id = 1) p",
    );
    assert_eq!(result, vec![vec![Value::String("Music".into())]]);
}

#[test]
fn test_ambiguous_column_across_joins() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE l(id INTEGER, v INTEGER)").unwrap();
    ctx.query("CREATE TABLE r(id INTEGER, v INTEGER)").unwrap();
    ctx.query("INSERT INTO l VALUES(1, 1)").unwrap();
    ctx.query("INSERT INTO r VALUES(1, 2)").unwrap();
    let err = ctx
        .query("SELECT v FROM l JOIN r ON l.id = r.id")
        .unwrap_err();
    assert!(err.to_string().contains("ambiguous"), "got {err}");
}

#[test]
fn test_select_star_with_joins() {
    let mut ctx = Context::new();
    ctx.query("CREATE TABLE l(id INTEGER)").unwrap();
    ctx.query("CREATE TABLE r(rid INTEGER, tag STRING)").unwrap();
    ctx.query("INSERT INTO l VALUES(1)").unwrap();
    ctx.query("INSERT INTO r VALUES(1, 'x')").unwrap();
    let Output::Rows(result) = ctx
        .query("SELECT * FROM l JOIN r ON r.rid = l.id")
        .unwrap()
    else {
        panic!()
    };
    assert_eq!(result.column_names(), vec!["id", "rid", "tag"]);
    assert_eq!(
        result.rows,
        vec![vec![
            Value::Integer(1),
            Value::Integer(1),
            Value::String("x".into()),
        ]]
    );
}

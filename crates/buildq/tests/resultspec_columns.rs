use anyhow::Context;
use buildq::db::{self, Db};
use buildq::models::BuildRow;
use buildq::resultspec::{
    DISPLAY_ID_FIELD, OrderSpec, ResultSpec, builds_field_mapping, resolve_column,
};
use buildq::store::builds;

fn sample_build(id: i64, number: i64) -> BuildRow {
    BuildRow {
        id,
        number,
        builderid: 7,
        buildrequestid: 100,
        workerid: None,
        complete: true,
        results: Some(0),
        state_string: "finished".to_string(),
        started_at_unix_ms: 1_770_000_000_000 + id as u64,
        complete_at_unix_ms: None,
    }
}

fn seeded_mart() -> Db {
    let db = Db::open_in_memory().expect("in-memory mart should open");
    db.ensure_schema().expect("schema should apply");

    db.with_conn(|conn| {
        db::insert_builder(conn, 7, "lin64")?;
        db::insert_buildrequest(conn, 100, 500)?;
        db::insert_build(conn, &sample_build(1, 41))?;
        db::insert_build(conn, &sample_build(2, 42))?;
        db::insert_build(conn, &sample_build(3, 43))?;
        Ok(())
    })
    .expect("fixtures should insert");

    db
}

#[test]
fn display_id_expression_evaluates_for_a_sample_row() {
    let db = seeded_mart();
    let expr = resolve_column(&builds_field_mapping(), DISPLAY_ID_FIELD)
        .expect("display id should resolve");

    let display_id = db
        .with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {expr} FROM builds WHERE builds.id = ?1"),
                [2],
                |row| row.get::<usize, String>(0),
            )
            .context("display id query should succeed")
        })
        .expect("display id query should succeed");

    assert_eq!(display_id, "7-42");
}

#[test]
fn order_limit_offset_shape_the_result_window() {
    let db = seeded_mart();
    let mut spec = ResultSpec::new();
    spec.order.push(OrderSpec::parse("-number"));
    spec.limit = Some(2);
    spec.offset = Some(1);

    let rows = builds::get_builds(&db, None, None, None, None, &spec)
        .expect("windowed query should succeed");
    let numbers: Vec<i64> = rows.iter().map(|row| row.number).collect();
    assert_eq!(numbers, vec![42, 41]);
}

#[test]
fn ordering_by_the_virtual_column_is_supported() {
    let db = seeded_mart();
    let mut spec = ResultSpec::new();
    spec.order.push(OrderSpec::parse("-display_id"));

    let rows = builds::get_builds(&db, None, None, None, None, &spec)
        .expect("virtual-column ordering should succeed");
    let numbers: Vec<i64> = rows.iter().map(|row| row.number).collect();
    assert_eq!(numbers, vec![43, 42, 41]);
}

#[test]
fn unresolvable_sort_field_fails_the_request() {
    let db = seeded_mart();
    let mut spec = ResultSpec::new();
    spec.order.push(OrderSpec::parse("no_such_field"));

    let err = builds::get_builds(&db, None, None, None, None, &spec)
        .expect_err("unknown sort field must fail");
    assert!(err.to_string().contains("no_such_field"));
}

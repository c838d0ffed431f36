use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row, params_from_iter};

use crate::db::{Db, SelectQuery, from_i64_ms};
use crate::models::BuildRow;
use crate::resultspec::{RequestArgs, ResultSpec, builds_field_mapping};

const BUILD_COLUMNS: &[&str] = &[
    "builds.id",
    "builds.number",
    "builds.builderid",
    "builds.buildrequestid",
    "builds.workerid",
    "builds.complete",
    "builds.results",
    "builds.state_string",
    "builds.started_at_unix_ms",
    "builds.complete_at_unix_ms",
];

struct RawBuildRow {
    id: i64,
    number: i64,
    builderid: i64,
    buildrequestid: i64,
    workerid: Option<i64>,
    complete: i64,
    results: Option<i64>,
    state_string: String,
    started_at: i64,
    complete_at: Option<i64>,
}

fn raw_build_row(row: &Row<'_>) -> rusqlite::Result<RawBuildRow> {
    Ok(RawBuildRow {
        id: row.get(0)?,
        number: row.get(1)?,
        builderid: row.get(2)?,
        buildrequestid: row.get(3)?,
        workerid: row.get(4)?,
        complete: row.get(5)?,
        results: row.get(6)?,
        state_string: row.get(7)?,
        started_at: row.get(8)?,
        complete_at: row.get(9)?,
    })
}

fn decode_build_row(raw: RawBuildRow) -> Result<BuildRow> {
    Ok(BuildRow {
        id: raw.id,
        number: raw.number,
        builderid: raw.builderid,
        buildrequestid: raw.buildrequestid,
        workerid: raw.workerid,
        complete: raw.complete != 0,
        results: raw.results,
        state_string: raw.state_string,
        started_at_unix_ms: from_i64_ms(raw.started_at, "started_at_unix_ms")?,
        complete_at_unix_ms: raw
            .complete_at
            .map(|value| from_i64_ms(value, "complete_at_unix_ms"))
            .transpose()?,
    })
}

/// Resolves the builder scope from `builderid` or `buildername` arguments.
/// `None` means either no scope argument was present or the builder does
/// not exist; callers that saw a scope argument treat `None` as "no such
/// builder".
pub fn resolve_builder_id(db: &Db, args: &mut RequestArgs) -> Result<Option<i64>> {
    if let Some(builderid) = args.pop_i64("builderid")? {
        return db.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM builders WHERE id = ?1",
                [builderid],
                |row| row.get(0),
            )
            .optional()
            .context("failed to resolve builder id")
        });
    }

    if let Some(name) = args.pop("buildername") {
        return db.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM builders WHERE name = ?1",
                [name.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to resolve builder name")
        });
    }

    Ok(None)
}

/// Base build query: the scope parameters are applied as direct
/// predicates, then the result spec compiles the remaining generic
/// filters, ordering, and pagination.
pub fn get_builds(
    db: &Db,
    builderid: Option<i64>,
    buildrequestid: Option<i64>,
    workerid: Option<i64>,
    complete: Option<bool>,
    spec: &ResultSpec,
) -> Result<Vec<BuildRow>> {
    let mut query = SelectQuery::new("builds", BUILD_COLUMNS);
    if let Some(builderid) = builderid {
        query.push_condition("builds.builderid = ?", [SqlValue::Integer(builderid)]);
    }
    if let Some(buildrequestid) = buildrequestid {
        query.push_condition(
            "builds.buildrequestid = ?",
            [SqlValue::Integer(buildrequestid)],
        );
    }
    if let Some(workerid) = workerid {
        query.push_condition("builds.workerid = ?", [SqlValue::Integer(workerid)]);
    }
    if let Some(complete) = complete {
        query.push_condition(
            "builds.complete = ?",
            [SqlValue::Integer(i64::from(complete))],
        );
    }
    spec.apply(&mut query, &builds_field_mapping())?;

    fetch_build_rows(db, &query)
}

/// Builds scoped to one change, joined through its build requests. Bypasses
/// the generic filtered query.
pub fn get_builds_for_change(db: &Db, changeid: i64) -> Result<Vec<BuildRow>> {
    let mut query = SelectQuery::new(
        "builds JOIN buildrequests ON builds.buildrequestid = buildrequests.id",
        BUILD_COLUMNS,
    );
    query.push_condition("buildrequests.changeid = ?", [SqlValue::Integer(changeid)]);
    query.push_order("builds.id ASC");

    fetch_build_rows(db, &query)
}

fn fetch_build_rows(db: &Db, query: &SelectQuery) -> Result<Vec<BuildRow>> {
    tracing::debug!(sql = %query.sql(), "fetching build rows");

    db.with_conn(|conn| {
        let mut statement = conn
            .prepare(&query.sql())
            .context("failed to prepare build query")?;
        let rows = statement
            .query_map(params_from_iter(query.params().iter()), raw_build_row)
            .context("failed to execute build query")?;

        let mut builds = Vec::new();
        for row in rows {
            builds.push(decode_build_row(
                row.context("failed to decode build row")?,
            )?);
        }
        Ok(builds)
    })
}

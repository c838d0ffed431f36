use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params};
use serde_json::Value;

use crate::models::{BuildId, BuildRow};

pub const BUILDERS_TABLE: &str = "builders";
pub const WORKERS_TABLE: &str = "workers";
pub const BUILDREQUESTS_TABLE: &str = "buildrequests";
pub const BUILDS_TABLE: &str = "builds";
pub const BUILD_PROPERTIES_TABLE: &str = "build_properties";

const CREATE_BUILDERS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS builders (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
"#;

const CREATE_WORKERS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS workers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
"#;

const CREATE_BUILDREQUESTS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS buildrequests (
    id INTEGER PRIMARY KEY,
    changeid INTEGER NOT NULL
);
"#;

const CREATE_BUILDS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS builds (
    id INTEGER PRIMARY KEY,
    number INTEGER NOT NULL,
    builderid INTEGER NOT NULL REFERENCES builders (id),
    buildrequestid INTEGER NOT NULL REFERENCES buildrequests (id),
    workerid INTEGER REFERENCES workers (id),
    complete INTEGER NOT NULL DEFAULT 0,
    results INTEGER,
    state_string TEXT NOT NULL DEFAULT '',
    started_at_unix_ms INTEGER NOT NULL,
    complete_at_unix_ms INTEGER,
    UNIQUE (builderid, number),
    CHECK (complete IN (0, 1))
);
"#;

const CREATE_BUILD_PROPERTIES_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS build_properties (
    buildid INTEGER NOT NULL REFERENCES builds (id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    source TEXT NOT NULL,
    PRIMARY KEY (buildid, name)
);
"#;

const CREATE_INDEX_BUILDS_BUILDER_NUMBER_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_builds_builder_number
ON builds (builderid, number);
"#;

const CREATE_INDEX_BUILDS_BUILDREQUEST_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_builds_buildrequest
ON builds (buildrequestid);
"#;

const CREATE_INDEX_BUILDREQUESTS_CHANGE_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_buildrequests_change
ON buildrequests (changeid);
"#;

#[must_use]
pub fn schema_statements() -> &'static [&'static str] {
    &[
        CREATE_BUILDERS_TABLE_SQL,
        CREATE_WORKERS_TABLE_SQL,
        CREATE_BUILDREQUESTS_TABLE_SQL,
        CREATE_BUILDS_TABLE_SQL,
        CREATE_BUILD_PROPERTIES_TABLE_SQL,
        CREATE_INDEX_BUILDS_BUILDER_NUMBER_SQL,
        CREATE_INDEX_BUILDS_BUILDREQUEST_SQL,
        CREATE_INDEX_BUILDREQUESTS_CHANGE_SQL,
    ]
}

#[must_use]
pub fn create_schema_sql() -> String {
    schema_statements().join("\n")
}

/// Handle on the build mart. Owns one connection behind a mutex; units of
/// work run serialized against it via [`Db::with_conn`].
#[derive(Debug)]
pub struct Db {
    conn: Mutex<Connection>,
    dispatches: AtomicU64,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create database parent directory: {}",
                    parent.display()
                )
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open build mart database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("failed to open in-memory build mart database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)
            .context("failed to enable foreign key enforcement")?;

        Ok(Self {
            conn: Mutex::new(conn),
            dispatches: AtomicU64::new(0),
        })
    }

    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(&create_schema_sql())
            .context("failed to create build mart schema")?;
        Ok(())
    }

    /// Runs one unit of work against the connection. Every call is one
    /// backing-store round trip, observable via [`Db::dispatch_count`].
    pub fn with_conn<T>(&self, work: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        let conn = self.lock()?;
        work(&conn)
    }

    /// Number of units of work dispatched so far.
    #[must_use]
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("build mart connection mutex poisoned"))
    }
}

/// A parameterized SELECT under assembly: the prepared-query input to the
/// store's execute-and-fetch primitive. Condition fragments use positional
/// `?` placeholders and must push their parameters in fragment order.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    columns: Vec<String>,
    from: String,
    conditions: Vec<String>,
    params: Vec<SqlValue>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectQuery {
    #[must_use]
    pub fn new(from: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|column| (*column).to_string()).collect(),
            from: from.into(),
            ..Self::default()
        }
    }

    pub fn push_condition(
        &mut self,
        fragment: impl Into<String>,
        params: impl IntoIterator<Item = SqlValue>,
    ) {
        self.conditions.push(fragment.into());
        self.params.extend(params);
    }

    /// `column IN (…)` over the given values; an empty set matches nothing.
    pub fn push_in_condition(&mut self, column: &str, values: impl IntoIterator<Item = SqlValue>) {
        let values: Vec<SqlValue> = values.into_iter().collect();
        if values.is_empty() {
            self.conditions.push("0 = 1".to_string());
            return;
        }

        let placeholders = vec!["?"; values.len()].join(", ");
        self.conditions.push(format!("{column} IN ({placeholders})"));
        self.params.extend(values);
    }

    pub fn push_order(&mut self, fragment: impl Into<String>) {
        self.order.push(fragment.into());
    }

    pub fn set_limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = Some(offset);
    }

    #[must_use]
    pub fn sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.from);
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        sql
    }

    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

pub fn insert_builder(conn: &Connection, id: i64, name: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO builders (id, name) VALUES (?1, ?2)",
        params![id, name],
    )
    .with_context(|| format!("failed to insert builder `{name}`"))?;
    Ok(())
}

pub fn insert_worker(conn: &Connection, id: i64, name: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO workers (id, name) VALUES (?1, ?2)",
        params![id, name],
    )
    .with_context(|| format!("failed to insert worker `{name}`"))?;
    Ok(())
}

pub fn insert_buildrequest(conn: &Connection, id: i64, changeid: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO buildrequests (id, changeid) VALUES (?1, ?2)",
        params![id, changeid],
    )
    .with_context(|| format!("failed to insert build request id={id}"))?;
    Ok(())
}

pub fn insert_build(conn: &Connection, build: &BuildRow) -> Result<()> {
    conn.execute(
        "INSERT INTO builds (id, number, builderid, buildrequestid, workerid, complete, results, state_string, started_at_unix_ms, complete_at_unix_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            build.id,
            build.number,
            build.builderid,
            build.buildrequestid,
            build.workerid,
            i64::from(build.complete),
            build.results,
            build.state_string,
            to_i64(build.started_at_unix_ms, "started_at_unix_ms")?,
            build
                .complete_at_unix_ms
                .map(|value| to_i64(value, "complete_at_unix_ms"))
                .transpose()?,
        ],
    )
    .with_context(|| format!("failed to insert build id={}", build.id))?;
    Ok(())
}

/// Property values are stored JSON-encoded; one row per (build, name).
pub fn insert_property(
    conn: &Connection,
    buildid: BuildId,
    name: &str,
    value: &Value,
    source: &str,
) -> Result<()> {
    let encoded = serde_json::to_string(value)
        .with_context(|| format!("failed to encode property `{name}` for build {buildid}"))?;
    conn.execute(
        "INSERT INTO build_properties (buildid, name, value, source)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(buildid, name) DO UPDATE SET
            value = excluded.value,
            source = excluded.source",
        params![buildid, name, encoded, source],
    )
    .with_context(|| format!("failed to insert property `{name}` for build {buildid}"))?;
    Ok(())
}

pub(crate) fn to_i64(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{field} exceeds sqlite INTEGER range"))
}

pub(crate) fn from_i64_ms(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} is negative in stored row"))
}

#[cfg(test)]
mod tests {
    use super::{
        BUILD_PROPERTIES_TABLE, BUILDERS_TABLE, BUILDREQUESTS_TABLE, BUILDS_TABLE, Db,
        SelectQuery, WORKERS_TABLE,
    };
    use rusqlite::Connection;
    use rusqlite::types::Value as SqlValue;

    fn table_exists(conn: &Connection, table_name: &str) -> bool {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1",
            [table_name],
            |_| Ok(()),
        )
        .is_ok()
    }

    #[test]
    fn ensure_schema_creates_mart_tables() {
        let db = Db::open_in_memory().expect("in-memory mart should open");
        db.ensure_schema().expect("schema creation should succeed");

        db.with_conn(|conn| {
            assert!(table_exists(conn, BUILDERS_TABLE));
            assert!(table_exists(conn, WORKERS_TABLE));
            assert!(table_exists(conn, BUILDREQUESTS_TABLE));
            assert!(table_exists(conn, BUILDS_TABLE));
            assert!(table_exists(conn, BUILD_PROPERTIES_TABLE));
            Ok(())
        })
        .expect("table inspection should succeed");
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let db = Db::open_in_memory().expect("in-memory mart should open");
        db.ensure_schema().expect("first schema ensure should succeed");
        db.ensure_schema().expect("second schema ensure should succeed");
    }

    #[test]
    fn with_conn_counts_one_dispatch_per_unit_of_work() {
        let db = Db::open_in_memory().expect("in-memory mart should open");
        assert_eq!(db.dispatch_count(), 0);

        db.with_conn(|_conn| Ok(())).expect("unit should run");
        db.with_conn(|_conn| Ok(())).expect("unit should run");
        assert_eq!(db.dispatch_count(), 2);
    }

    #[test]
    fn select_query_assembles_clauses_in_order() {
        let mut query = SelectQuery::new("builds", &["builds.id", "builds.number"]);
        query.push_condition("builds.builderid = ?", [SqlValue::Integer(7)]);
        query.push_in_condition(
            "builds.id",
            [SqlValue::Integer(1), SqlValue::Integer(2)],
        );
        query.push_order("builds.number DESC");
        query.set_limit(2);
        query.set_offset(1);

        assert_eq!(
            query.sql(),
            "SELECT builds.id, builds.number FROM builds \
             WHERE builds.builderid = ? AND builds.id IN (?, ?) \
             ORDER BY builds.number DESC LIMIT 2 OFFSET 1"
        );
        assert_eq!(query.params().len(), 3);
    }

    #[test]
    fn select_query_empty_in_set_matches_nothing() {
        let mut query = SelectQuery::new("builds", &["builds.id"]);
        query.push_in_condition("builds.id", []);
        assert_eq!(query.sql(), "SELECT builds.id FROM builds WHERE 0 = 1");
        assert!(query.params().is_empty());
    }

    #[test]
    fn offset_without_limit_uses_unbounded_limit() {
        let mut query = SelectQuery::new("builds", &["builds.id"]);
        query.set_offset(3);
        assert_eq!(query.sql(), "SELECT builds.id FROM builds LIMIT -1 OFFSET 3");
    }
}

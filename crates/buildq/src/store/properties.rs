//! Batched property reads over the build_properties relation.
//!
//! One call is one backing-store round trip no matter how many builds are
//! requested; fetching per build is exactly what this store exists to
//! avoid.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

use crate::db::{Db, SelectQuery};
use crate::models::{BuildId, BuildProperties, PropertyBundle, PropertyEntry};
use crate::resultspec::{ResultSpec, properties_field_mapping};

const PROPERTY_COLUMNS: &[&str] = &[
    "build_properties.buildid",
    "build_properties.name",
    "build_properties.value",
    "build_properties.source",
];

/// Fetches properties for many builds in a single query.
///
/// An empty id set short-circuits to an empty bundle without touching the
/// store. A non-empty `names` set restricts the result to those property
/// names. When `shaping` is supplied it transforms the query before rows
/// are consumed; the store itself never sorts or paginates.
pub fn fetch_many(
    db: &Db,
    build_ids: &[BuildId],
    names: Option<&BTreeSet<String>>,
    shaping: Option<&ResultSpec>,
) -> Result<PropertyBundle> {
    if build_ids.is_empty() {
        return Ok(PropertyBundle::new());
    }

    let mut query = SelectQuery::new("build_properties", PROPERTY_COLUMNS);
    query.push_in_condition(
        "build_properties.buildid",
        build_ids.iter().map(|id| SqlValue::Integer(*id)),
    );
    if let Some(names) = names
        && !names.is_empty()
    {
        query.push_in_condition(
            "build_properties.name",
            names.iter().map(|name| SqlValue::Text(name.clone())),
        );
    }
    if let Some(spec) = shaping {
        spec.apply(&mut query, &properties_field_mapping())?;
    }

    tracing::debug!(build_count = build_ids.len(), "fetching build properties");

    db.with_conn(|conn| {
        let mut statement = conn
            .prepare(&query.sql())
            .context("failed to prepare build property query")?;
        let rows = statement
            .query_map(params_from_iter(query.params().iter()), |row| {
                Ok((
                    row.get::<usize, i64>(0)?,
                    row.get::<usize, String>(1)?,
                    row.get::<usize, String>(2)?,
                    row.get::<usize, String>(3)?,
                ))
            })
            .context("failed to execute build property query")?;

        let mut bundle = PropertyBundle::new();
        for row in rows {
            let (buildid, name, raw_value, source) =
                row.context("failed to decode build property row")?;
            let value = serde_json::from_str(&raw_value).with_context(|| {
                format!("failed to decode property `{name}` for build {buildid}")
            })?;
            bundle
                .entry(buildid)
                .or_default()
                .insert(name, PropertyEntry { value, source });
        }
        Ok(bundle)
    })
}

/// Single-build convenience wrapper over [`fetch_many`]: unwraps the
/// one-entry bundle, yielding an empty mapping when the build has no
/// matching properties.
pub fn fetch_one(
    db: &Db,
    build_id: BuildId,
    names: Option<&BTreeSet<String>>,
    shaping: Option<&ResultSpec>,
) -> Result<BuildProperties> {
    let mut bundle = fetch_many(db, &[build_id], names, shaping)?;
    Ok(bundle.remove(&build_id).unwrap_or_default())
}

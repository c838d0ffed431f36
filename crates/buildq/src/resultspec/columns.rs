use std::collections::BTreeMap;

use anyhow::{Result, anyhow, bail};

/// Logical field name to qualified physical column mapping for one query
/// shape.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    entries: BTreeMap<&'static str, &'static str>,
}

impl FieldMapping {
    #[must_use]
    pub fn new(entries: &[(&'static str, &'static str)]) -> Self {
        Self {
            entries: entries.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn physical(&self, field: &str) -> Option<&'static str> {
        self.entries.get(field).copied()
    }
}

/// Mapping for queries over the builds table.
#[must_use]
pub fn builds_field_mapping() -> FieldMapping {
    FieldMapping::new(&[
        ("buildid", "builds.id"),
        ("number", "builds.number"),
        ("builderid", "builds.builderid"),
        ("buildrequestid", "builds.buildrequestid"),
        ("workerid", "builds.workerid"),
        ("complete", "builds.complete"),
        ("results", "builds.results"),
        ("state_string", "builds.state_string"),
        ("started_at", "builds.started_at_unix_ms"),
        ("complete_at", "builds.complete_at_unix_ms"),
    ])
}

/// Mapping for queries over the build_properties table.
#[must_use]
pub fn properties_field_mapping() -> FieldMapping {
    FieldMapping::new(&[
        ("buildid", "build_properties.buildid"),
        ("name", "build_properties.name"),
        ("source", "build_properties.source"),
    ])
}

pub const DISPLAY_ID_FIELD: &str = "display_id";

type VirtualExpr = fn(&FieldMapping) -> Result<String>;

/// Virtual columns: computed expressions usable wherever a physical column
/// is. Each builder sees only qualified physical columns.
const VIRTUAL_COLUMNS: &[(&str, VirtualExpr)] = &[(DISPLAY_ID_FIELD, display_id_expr)];

/// The display identifier concatenates builder id and per-builder build
/// number with a literal hyphen, e.g. builder 7 build 42 -> "7-42".
fn display_id_expr(mapping: &FieldMapping) -> Result<String> {
    let builderid = require_physical(mapping, "builderid", DISPLAY_ID_FIELD)?;
    let number = require_physical(mapping, "number", DISPLAY_ID_FIELD)?;
    Ok(format!("{builderid} || '-' || {number}"))
}

fn require_physical(
    mapping: &FieldMapping,
    field: &'static str,
    virtual_field: &'static str,
) -> Result<&'static str> {
    mapping.physical(field).ok_or_else(|| {
        anyhow!("virtual column `{virtual_field}` requires a mapped `{field}` column")
    })
}

/// Resolves a logical field name to the column expression it denotes:
/// virtual registry first, then the generic mapping. Unknown names are a
/// configuration defect and fail deterministically.
pub fn resolve_column(mapping: &FieldMapping, field: &str) -> Result<String> {
    for (name, expr) in VIRTUAL_COLUMNS {
        if *name == field {
            return expr(mapping);
        }
    }

    match mapping.physical(field) {
        Some(column) => Ok(column.to_string()),
        None => bail!("no column for field `{field}`"),
    }
}

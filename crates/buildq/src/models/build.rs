use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::time::format_unix_ms;

pub type BuildId = i64;

/// One build's properties keyed by property name.
pub type BuildProperties = BTreeMap<String, PropertyEntry>;

/// Batch-fetch result keyed by build id. Builds with no matching property
/// rows are absent from the map.
pub type PropertyBundle = BTreeMap<BuildId, BuildProperties>;

/// A decoded property value plus the provenance tag recording what set it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PropertyEntry {
    pub value: Value,
    pub source: String,
}

/// One build row as stored in the mart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BuildRow {
    pub id: BuildId,
    pub number: i64,
    pub builderid: i64,
    pub buildrequestid: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workerid: Option<i64>,

    pub complete: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<i64>,

    pub state_string: String,
    pub started_at_unix_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_at_unix_ms: Option<u64>,
}

/// Outward-facing view of one build, as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BuildView {
    pub id: BuildId,
    pub display_id: String,
    pub number: i64,
    pub builderid: i64,
    pub buildrequestid: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workerid: Option<i64>,

    pub complete: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<i64>,

    pub state_string: String,
    pub started_at_utc: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_at_utc: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BuildProperties>,
}

impl BuildView {
    /// Assembles the view of one build row. The properties field starts as
    /// an empty map; the list endpoint strips or overwrites it.
    #[must_use]
    pub fn from_row(row: &BuildRow) -> Self {
        Self {
            id: row.id,
            display_id: format!("{}-{}", row.builderid, row.number),
            number: row.number,
            builderid: row.builderid,
            buildrequestid: row.buildrequestid,
            workerid: row.workerid,
            complete: row.complete,
            results: row.results,
            state_string: row.state_string.clone(),
            started_at_utc: format_unix_ms(row.started_at_unix_ms),
            complete_at_utc: row.complete_at_unix_ms.map(format_unix_ms),
            properties: Some(BuildProperties::new()),
        }
    }
}

#[must_use]
pub fn json_schema() -> Value {
    let schema = schemars::schema_for!(BuildView);
    match serde_json::to_value(schema) {
        Ok(value) => value,
        Err(error) => {
            panic!("failed to serialize generated build view schema: {error}");
        }
    }
}

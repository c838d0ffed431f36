use std::collections::BTreeMap;

use buildq::models::{BuildRow, BuildView, json_schema};
use serde_json::Value;

fn sample_row() -> BuildRow {
    BuildRow {
        id: 2,
        number: 42,
        builderid: 7,
        buildrequestid: 101,
        workerid: None,
        complete: false,
        results: None,
        state_string: "building".to_string(),
        started_at_unix_ms: 1_770_274_803_000,
        complete_at_unix_ms: None,
    }
}

#[test]
fn schema_marks_core_fields_as_required() {
    let schema = json_schema();
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .expect("schema must include required list");

    for field in [
        "id",
        "display_id",
        "number",
        "builderid",
        "buildrequestid",
        "complete",
        "state_string",
        "started_at_utc",
    ] {
        assert!(
            required.iter().any(|value| value.as_str() == Some(field)),
            "field `{field}` must be required"
        );
    }
}

#[test]
fn assembler_populates_the_view_from_the_row() {
    let view = BuildView::from_row(&sample_row());

    assert_eq!(view.display_id, "7-42");
    assert_eq!(view.started_at_utc, "2026-02-05T07:00:03.000Z");
    assert_eq!(
        view.properties,
        Some(BTreeMap::new()),
        "properties default to an empty map until the endpoint decides"
    );
}

#[test]
fn serialization_omits_absent_optional_fields() {
    let mut view = BuildView::from_row(&sample_row());
    view.properties = None;

    let value = serde_json::to_value(view).expect("view serialization should succeed");
    let object = value
        .as_object()
        .expect("serialized view should be a json object");

    assert_eq!(object.get("display_id").and_then(Value::as_str), Some("7-42"));
    assert!(!object.contains_key("workerid"));
    assert!(!object.contains_key("results"));
    assert!(!object.contains_key("complete_at_utc"));
    assert!(!object.contains_key("properties"));
}

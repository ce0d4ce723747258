//! Differ properties over realistic participant records.

use formsync_core::{diff, diff_with, DiffPolicy, Record, Snapshot, Value};
use serde_json::json;

fn rec(json: serde_json::Value) -> Record {
    Record::from_json(&json).unwrap()
}

fn fixtures() -> Vec<Record> {
    vec![
        rec(json!({})),
        rec(json!({ "firstName": "Jo", "hours": 0, "rate": 31.5 })),
        rec(json!({
            "firstName": "Jo",
            "skills": ["first aid", "driving"],
            "emergencyContact": { "name": "Al", "phone": null },
            "notes": ""
        })),
        rec(json!({ "legacyId": { "$delete": true }, "tags": [] })),
    ]
}

#[test]
fn diffing_a_record_against_itself_is_empty() {
    for record in fixtures() {
        assert!(diff(&record, &record).is_empty(), "{}", record.to_json());
        assert!(
            diff_with(&DiffPolicy::strict(), &record, &record).is_empty(),
            "{}",
            record.to_json()
        );
    }
}

#[test]
fn single_field_edit_yields_exactly_that_field() {
    for original in fixtures() {
        let mut current = original.clone();
        current.insert("firstName", "Sam");
        let patch = diff(&original, &current);
        assert_eq!(patch.to_json(), json!({ "firstName": "Sam" }));
    }
}

#[test]
fn blank_text_is_only_an_edit_over_a_real_value() {
    assert!(diff(&rec(json!({})), &rec(json!({ "name": "" }))).is_empty());
    assert!(!diff(&rec(json!({ "name": "x" })), &rec(json!({ "name": "" }))).is_empty());
}

#[test]
fn location_edit_omits_untouched_dependents() {
    let snapshot = Snapshot::new(rec(json!({
        "firstName": "Jo",
        "stateId": "NSW-1",
        "regionId": "R1",
        "serviceAreaId": "SA1"
    })));
    let mut working = snapshot.fork();
    working.set(&"stateId".parse().unwrap(), Value::from("VIC-1")).unwrap();
    working.unset(&"regionId".parse().unwrap());
    working.unset(&"serviceAreaId".parse().unwrap());
    working.set(&"regionId".parse().unwrap(), Value::from("R9")).unwrap();

    let patch = working.diff(&DiffPolicy::default(), &snapshot);
    assert_eq!(patch.to_json(), json!({ "stateId": "VIC-1", "regionId": "R9" }));
}

#[test]
fn patches_serialize_as_plain_objects() {
    let patch = diff(
        &rec(json!({ "legacyId": "L-1" })),
        &rec(json!({ "legacyId": { "$delete": true }, "hours": 7.25 })),
    );
    let wire = serde_json::to_value(&patch).unwrap();
    assert_eq!(wire, json!({ "hours": 7.25, "legacyId": { "$delete": true } }));
}

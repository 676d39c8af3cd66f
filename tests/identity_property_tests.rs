//! Property tests for deterministic job and task identities.

use geoflow_core::identity::{canonical_json, generate_job_id, generate_task_id};
use geoflow_core::validation::{validate_request, ParameterSchema, FieldSpec, ValidationMode};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

fn schema() -> ParameterSchema {
    ParameterSchema::new()
        .field(FieldSpec::string("container"))
        .field(FieldSpec::integer("n"))
        .field(FieldSpec::string("message"))
}

fn identifier_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

fn request_fields_strategy() -> impl Strategy<Value = Vec<(String, Value)>> {
    (
        identifier_strategy(),
        identifier_strategy(),
        identifier_strategy(),
        identifier_strategy(),
        0i64..1000,
        "[ -~]{0,40}",
    )
        .prop_map(|(dataset, resource, version, container, n, message)| {
            vec![
                ("job_type".to_string(), json!("hello_world")),
                ("dataset_id".to_string(), json!(dataset)),
                ("resource_id".to_string(), json!(resource)),
                ("version_id".to_string(), json!(version)),
                ("container".to_string(), json!(container)),
                ("n".to_string(), json!(n)),
                ("message".to_string(), json!(message)),
            ]
        })
}

fn object_in_order(fields: &[(String, Value)], order: &[usize]) -> Value {
    let mut map = Map::new();
    for &i in order {
        let (key, value) = &fields[i];
        map.insert(key.clone(), value.clone());
    }
    Value::Object(map)
}

fn job_id(request: &Value) -> String {
    let validated = validate_request(request, &schema(), ValidationMode::Strict).unwrap();
    generate_job_id(&validated).unwrap()
}

proptest! {
    /// Property: field order never changes the job identity
    #[test]
    fn job_id_ignores_field_order(
        fields in request_fields_strategy(),
        order in Just((0..7).collect::<Vec<usize>>()).prop_shuffle(),
    ) {
        let natural = object_in_order(&fields, &(0..7).collect::<Vec<_>>());
        let shuffled = object_in_order(&fields, &order);
        let id = job_id(&natural);
        prop_assert_eq!(id.len(), 64);
        prop_assert_eq!(id, job_id(&shuffled));
    }

    /// Property: every index of a fan-out gets its own task identity
    #[test]
    fn task_ids_unique_across_fan_out(job in "[0-9a-f]{64}", count in 1u32..300) {
        let params = json!({"message": "Hello World"});
        let ids: BTreeSet<String> = (0..count)
            .map(|index| generate_task_id(&job, "hello_world_greeting", 1, index, &params).unwrap())
            .collect();
        prop_assert_eq!(ids.len(), count as usize);
    }

    /// Property: volatile timestamps do not change a task identity
    #[test]
    fn task_id_ignores_volatile_keys(index in 0u32..1000, stamp in "[0-9T:-]{10,25}") {
        let stable = json!({"path": "a.tif"});
        let stamped = json!({"path": "a.tif", "created_at": stamp, "submitted_at": stamp});
        prop_assert_eq!(
            generate_task_id("job", "validate_file", 1, index, &stable).unwrap(),
            generate_task_id("job", "validate_file", 1, index, &stamped).unwrap()
        );
    }

    /// Property: the same index in different stages is a different task
    #[test]
    fn task_id_scoped_by_stage(index in 0u32..1000) {
        let params = json!({});
        prop_assert_ne!(
            generate_task_id("job", "t", 1, index, &params).unwrap(),
            generate_task_id("job", "t", 2, index, &params).unwrap()
        );
    }

    /// Property: canonical JSON sorts nested keys
    #[test]
    fn canonical_json_sorts_nested_keys(a in 0i64..100, b in 0i64..100) {
        let one = json!({"outer": {"b": b, "a": a}, "z": [ {"y": 1, "x": 2} ]});
        let two = json!({"z": [ {"x": 2, "y": 1} ], "outer": {"a": a, "b": b}});
        prop_assert_eq!(canonical_json(&one).unwrap(), canonical_json(&two).unwrap());
    }
}

//! # Deterministic Identity
//!
//! Job and task identifiers are content hashes. Two semantically equal submissions
//! always map to the same job, and re-creating a stage's tasks for the same job
//! always yields the same task identifiers, so every write is idempotent.
//!
//! Canonical form: JSON with object keys sorted at every level and no insignificant
//! whitespace. Key order in the submitted document never affects identity.

use crate::constants::{TASK_ID_LENGTH, VOLATILE_PARAMETER_KEYS};
use crate::validation::ValidatedRequest;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonical JSON text for any serializable value
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> serde_json::Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out)?;
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// 64-character job identifier over the normalized request
pub fn generate_job_id(request: &ValidatedRequest) -> serde_json::Result<String> {
    Ok(sha256_hex(&canonical_json(&request.normalized())?))
}

/// Task identifier over parent job, task type, stage, index and stable parameters
pub fn generate_task_id(
    job_id: &str,
    task_type: &str,
    stage: u32,
    index: u32,
    parameters: &Value,
) -> serde_json::Result<String> {
    let stable = stable_parameters(parameters);
    let material = serde_json::json!({
        "job_id": job_id,
        "task_type": task_type,
        "stage": stage,
        "index": index,
        "parameters": stable,
    });
    let mut digest = sha256_hex(&canonical_json(&material)?);
    digest.truncate(TASK_ID_LENGTH);
    Ok(digest)
}

/// Drop top-level keys that vary between otherwise identical task definitions
fn stable_parameters(parameters: &Value) -> Value {
    match parameters {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !VOLATILE_PARAMETER_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::requests::{AttemptRecord, RequestSummary};

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// What was actually sent for the successful attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGeneration {
    pub prompt: String,
    pub model: String,
    pub seed: i64,
    pub reference_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub content_type: Option<String>,
}

pub fn build_receipt(
    request: &RequestSummary,
    resolved: &ResolvedGeneration,
    attempts: &[AttemptRecord],
    image_path: &Path,
    prompt_path: &Path,
) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert(
        "request".to_string(),
        sanitize_payload(&serde_json::to_value(request).unwrap_or(Value::Null)),
    );
    root.insert(
        "resolved".to_string(),
        sanitize_payload(&serde_json::to_value(resolved).unwrap_or(Value::Null)),
    );
    root.insert(
        "attempts".to_string(),
        sanitize_payload(&serde_json::to_value(attempts).unwrap_or(Value::Null)),
    );

    let mut artifacts = Map::new();
    artifacts.insert(
        "image_path".to_string(),
        Value::String(image_path.to_string_lossy().to_string()),
    );
    artifacts.insert(
        "prompt_path".to_string(),
        Value::String(prompt_path.to_string_lossy().to_string()),
    );
    root.insert("artifacts".to_string(), Value::Object(artifacts));
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

pub fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(lowered.as_str(), "key" | "api_key") {
                    out.insert(key.clone(), Value::String("<redacted>".to_string()));
                    continue;
                }
                if matches!(lowered.as_str(), "bytes" | "image_bytes" | "data") {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}

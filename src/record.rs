//! Raw record normalization.
//!
//! Extractors return opaque key/value records; before anything is persisted,
//! the runtime normalizes them into plain JSON objects. No extractor-specific
//! types leak past this boundary: a record that cannot be represented as a
//! string-keyed mapping of primitives, arrays and nested mappings converts the
//! whole result to a `NormalizationError`.

use serde::Serialize;
use serde_json::Value;

/// An opaque extracted record. Normalization enforces the object shape.
pub type RawRecord = Value;

/// Nesting depth allowed inside a record.
const MAX_DEPTH: usize = 16;

/// Serialize extractor-native structs into raw records.
pub fn to_raw<T: Serialize>(items: &[T]) -> anyhow::Result<Vec<RawRecord>> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(Into::into))
        .collect()
}

/// Validate that every record is a JSON object of bounded depth.
///
/// Returns the records unchanged on success, or a message naming the first
/// offending record on failure.
pub fn normalize(records: Vec<RawRecord>) -> Result<Vec<RawRecord>, String> {
    for (i, record) in records.iter().enumerate() {
        if !record.is_object() {
            return Err(format!(
                "record {i} is not a key/value mapping (got {})",
                type_name(record)
            ));
        }
        check_depth(record, 0).map_err(|depth| {
            format!("record {i} exceeds the maximum nesting depth of {depth}")
        })?;
    }
    Ok(records)
}

/// Assemble the artifact payload: an array of records, or the bare object for
/// extractors that produce exactly one record per run.
pub fn payload(records: &[RawRecord], singleton: bool) -> Value {
    if singleton && records.len() == 1 {
        records[0].clone()
    } else {
        Value::Array(records.to_vec())
    }
}

fn check_depth(value: &Value, depth: usize) -> Result<(), usize> {
    if depth > MAX_DEPTH {
        return Err(MAX_DEPTH);
    }
    match value {
        Value::Object(map) => map.values().try_for_each(|v| check_depth(v, depth + 1)),
        Value::Array(items) => items.iter().try_for_each(|v| check_depth(v, depth + 1)),
        _ => Ok(()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Book {
        title: String,
        percent: Option<u32>,
    }

    #[test]
    fn test_to_raw_produces_objects() {
        let raw = to_raw(&[Book {
            title: "Dune".to_string(),
            percent: Some(26),
        }])
        .unwrap();
        assert_eq!(raw, vec![json!({"title": "Dune", "percent": 26})]);
    }

    #[test]
    fn test_normalize_accepts_nested_mappings() {
        let records = vec![json!({"a": {"b": {"c": [1, 2, "x"]}}, "d": null})];
        assert!(normalize(records).is_ok());
    }

    #[test]
    fn test_normalize_rejects_non_object_record() {
        let err = normalize(vec![json!({"ok": 1}), json!([1, 2, 3])]).unwrap_err();
        assert!(err.contains("record 1"), "got: {err}");
        assert!(err.contains("array"));
    }

    #[test]
    fn test_normalize_rejects_excessive_depth() {
        let mut value = json!("leaf");
        for _ in 0..32 {
            value = json!({ "next": value });
        }
        assert!(normalize(vec![value]).is_err());
    }

    #[test]
    fn test_payload_shapes() {
        let records = vec![json!({"about": "hi"})];
        assert!(payload(&records, true).is_object());
        assert!(payload(&records, false).is_array());
        // A singleton extractor that returned several records still gets an array.
        let many = vec![json!({"a": 1}), json!({"b": 2})];
        assert!(payload(&many, true).is_array());
    }
}

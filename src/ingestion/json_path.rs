//! Flattening a JSON document into a table through a JSONPath expression.
//!
//! The expression must select an array. Two shapes are accepted:
//!
//! - an array of objects: the header is the sorted union of all keys, and each object becomes
//!   one row with blanks for missing keys;
//! - an array of arrays: the first inner array is the header and the rest are positional rows.
//!
//! Cells are text: `null` becomes an empty string, strings are unquoted, nested objects and
//! arrays are re-serialized as compact JSON.

use std::collections::HashMap;

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::error::{IngestionError, IngestionResult};

use super::headers::normalize_headers;

/// Tabular result of a JSONPath query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl JsonTable {
    /// Header followed by rows, as one record list.
    pub fn into_records(self) -> Vec<Vec<String>> {
        let mut records = Vec::with_capacity(self.rows.len() + 1);
        records.push(self.header);
        records.extend(self.rows);
        records
    }
}

/// Text form of a JSON value as a table cell.
pub fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Evaluate `expression` against `doc` and flatten the first match into a table.
pub fn apply_json_path(doc: &Value, expression: &str) -> IngestionResult<JsonTable> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(IngestionError::format("JSONPath expression is required for JSON files"));
    }
    let path = JsonPath::parse(expression)
        .map_err(|e| IngestionError::json_path(format!("invalid JSONPath expression {expression:?}: {e}")))?;

    let nodes = path.query(doc);
    let Some(result) = nodes.first() else {
        return Err(IngestionError::json_path("JSONPath expression returned no results"));
    };

    match result {
        Value::Array(items) => match items.first() {
            None => Err(IngestionError::json_path("JSONPath expression returned an empty array")),
            Some(Value::Object(_)) => Ok(table_from_objects(items)),
            Some(Value::Array(_)) => Ok(table_from_arrays(items)),
            Some(other) => Err(IngestionError::json_path(format!(
                "JSONPath expression must return an array of objects or an array of arrays, \
                 found an array of {}",
                type_name(other)
            ))),
        },
        Value::Object(map) => Err(IngestionError::JsonPath {
            message: "JSONPath expression must return an array. Current result is an object."
                .to_owned(),
            available_keys: map.keys().cloned().collect(),
        }),
        other => Err(IngestionError::json_path(format!(
            "JSONPath expression must return an array. Current result type: {}",
            type_name(other)
        ))),
    }
}

fn table_from_objects(items: &[Value]) -> JsonTable {
    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(items.len());

    for item in items {
        let Value::Object(obj) = item else {
            continue;
        };
        let mut row = vec![String::new(); columns.len()];
        for (key, value) in obj {
            let col = *index.entry(key.clone()).or_insert_with(|| {
                columns.push(key.clone());
                columns.len() - 1
            });
            if col >= row.len() {
                row.resize(col + 1, String::new());
            }
            row[col] = json_cell(value);
        }
        rows.push(row);
    }

    // Rows built before a key first appeared are shorter; the remap below pads them.
    let mut order: Vec<usize> = (0..columns.len()).collect();
    order.sort_by(|&a, &b| columns[a].cmp(&columns[b]));

    let rows = rows
        .into_iter()
        .map(|row| {
            order
                .iter()
                .map(|&old| row.get(old).cloned().unwrap_or_default())
                .collect()
        })
        .collect();
    let sorted: Vec<&String> = order.iter().map(|&i| &columns[i]).collect();

    JsonTable {
        header: normalize_headers(&sorted),
        rows,
    }
}

fn table_from_arrays(items: &[Value]) -> JsonTable {
    let mut arrays = items.iter().filter_map(|item| match item {
        Value::Array(a) => Some(a),
        _ => None,
    });
    let header = arrays
        .next()
        .map(|first| first.iter().map(json_cell).collect::<Vec<_>>())
        .unwrap_or_default();
    let rows = arrays.map(|a| a.iter().map(json_cell).collect()).collect();
    JsonTable {
        header: normalize_headers(&header),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_union_sorted_keys_and_blank_fill() {
        let doc = json!({"items": [{"b": 1, "a": "x"}, {"c": null, "a": "y"}]});
        let t = apply_json_path(&doc, "$.items").unwrap();
        assert_eq!(t.header, vec!["a", "b", "c"]);
        assert_eq!(t.rows, vec![vec!["x", "1", ""], vec!["y", "", ""]]);
    }

    #[test]
    fn nested_values_become_compact_json() {
        let doc = json!([{"obj": {"k": [1, 2]}, "flag": true}]);
        let t = apply_json_path(&doc, "$").unwrap();
        assert_eq!(t.header, vec!["flag", "obj"]);
        assert_eq!(t.rows[0], vec!["true", r#"{"k":[1,2]}"#]);
    }

    #[test]
    fn arrays_use_first_row_as_header() {
        let doc = json!({"rows": [["id", ""], [1, "a"], [2]]});
        let t = apply_json_path(&doc, "$.rows").unwrap();
        assert_eq!(t.header, vec!["id", "Unnamed_A"]);
        assert_eq!(t.rows, vec![vec!["1", "a"], vec!["2"]]);
    }

    #[test]
    fn object_result_reports_keys() {
        let doc = json!({"meta": {"version": 1, "items": []}});
        match apply_json_path(&doc, "$.meta").unwrap_err() {
            IngestionError::JsonPath { available_keys, .. } => {
                let mut keys = available_keys;
                keys.sort();
                assert_eq!(keys, vec!["items", "version"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn shape_violations_are_errors() {
        let doc = json!({"n": 5, "empty": [], "nums": [1, 2]});
        for expr in ["$.n", "$.empty", "$.nums", "$.missing", "not a path"] {
            assert!(matches!(
                apply_json_path(&doc, expr),
                Err(IngestionError::JsonPath { .. })
            ));
        }
        assert!(matches!(
            apply_json_path(&doc, ""),
            Err(IngestionError::FormatContract { .. })
        ));
    }

    #[test]
    fn non_object_items_are_skipped() {
        let doc = json!([{"a": 1}, 7, "x", {"a": 2}]);
        let t = apply_json_path(&doc, "$").unwrap();
        assert_eq!(t.rows, vec![vec!["1"], vec!["2"]]);
    }
}

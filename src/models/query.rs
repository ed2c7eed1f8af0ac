//! Query-related data models.

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// One result row: column name to dynamically typed value, in select-list order.
pub type Row = serde_json::Map<String, JsonValue>;

/// Rows produced by a read-only query.
///
/// Serialized as `{ "result": [ {..}, .. ] }`, the payload of the query tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
pub struct QueryResult {
    /// Result rows as column-name to value maps
    pub result: Vec<Row>,
}

impl QueryResult {
    pub fn new(result: Vec<Row>) -> Self {
        Self { result }
    }

    pub fn row_count(&self) -> usize {
        self.result.len()
    }

    /// Pretty-printed JSON text, the textual mirror of the structured payload.
    pub fn to_text(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{\"result\":[]}".to_string())
    }

    /// Structured payload as a JSON value.
    pub fn to_value(&self) -> JsonValue {
        let rows = self
            .result
            .iter()
            .cloned()
            .map(JsonValue::Object)
            .collect::<Vec<_>>();
        serde_json::json!({ "result": rows })
    }
}

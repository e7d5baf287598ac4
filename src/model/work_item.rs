use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of a WIQL query result: just enough to drive a detail fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemReference {
    pub id: i64,
    pub url: String,
}

/// Response of the WIQL query endpoint, trimmed to the members we expose.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemQueryResponse {
    pub query_type: String,
    pub query_result_type: String,
    pub as_of: DateTime<Utc>,
    pub work_items: Vec<WorkItemReference>,
}

/// Full work item as returned by the detail endpoints.
///
/// `fields` is an open mapping: Azure DevOps projects carry arbitrary custom
/// and board-extension fields (e.g. `Custom.*`, `WEF_*` Kanban columns), so we
/// keep it as raw JSON rather than a closed struct. Sanitization prunes it in
/// place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: i64,
    pub rev: i64,
    pub fields: serde_json::Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiline_fields_format: Option<Value>,
    #[serde(rename = "_links", default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Envelope of the batch-by-ids endpoint (`GET .../workitems?ids=...`).
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItemBatchResponse {
    pub count: i64,
    pub value: Vec<WorkItem>,
}

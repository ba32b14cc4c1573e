//! Wire and schema models for the GitHub Projects v2 sync target.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Semantic roles the board's custom fields are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Budget,
    Category,
    Tags,
    Status,
    Size,
    StartDate,
    EndDate,
}

/// One resolved project field; single-select fields carry their option
/// name → option id table.
#[derive(Debug, Clone)]
pub struct ProjectField {
    pub id: String,
    pub options: HashMap<String, String>,
}

/// The board's identity and field schema, resolved once per process.
#[derive(Debug, Clone)]
pub struct BoardSchema {
    pub project_id: String,
    pub title: String,
    pub fields: HashMap<FieldRole, ProjectField>,
}

impl BoardSchema {
    pub fn field(&self, role: FieldRole) -> Option<&ProjectField> {
        self.fields.get(&role)
    }
}

/// Typed field value with one encoder per variant. `SingleSelect` carries the
/// resolved option id, not the display name.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(chrono::NaiveDate),
    SingleSelect(String),
}

impl FieldValue {
    /// Encode as the `ProjectV2FieldValue` input object.
    pub fn encode(&self) -> Value {
        match self {
            FieldValue::Text(t) => json!({ "text": t }),
            FieldValue::Number(n) => json!({ "number": n }),
            FieldValue::Date(d) => json!({ "date": d.format("%Y-%m-%d").to_string() }),
            FieldValue::SingleSelect(id) => json!({ "singleSelectOptionId": id }),
        }
    }
}

/// What `create_item` produced on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Draft,
    Issue,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Draft => "draft",
            ItemKind::Issue => "issue",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatedItem {
    pub item_id: String,
    pub kind: ItemKind,
    pub issue_url: Option<String>,
}

/// Counts from the administrative clear sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearReport {
    pub found: usize,
    pub deleted: usize,
}

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQlEnvelope {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<Value>>,
}

/// One node of the project `fields` connection; nodes of unmatched fragment
/// types arrive as `{}` and fail to parse, which is how they get skipped.
#[derive(Debug, Deserialize)]
pub struct WireField {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub options: Vec<WireOption>,
}

#[derive(Debug, Deserialize)]
pub struct WireOption {
    pub id: String,
    pub name: String,
}

/// REST response for issue creation; `node_id` is what the board attach
/// mutation wants.
#[derive(Debug, Deserialize)]
pub struct IssueCreated {
    pub node_id: String,
    pub number: i64,
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

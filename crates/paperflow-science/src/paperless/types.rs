use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of a Paperless list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.as_deref().is_some_and(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteTag {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteDocumentType {
    pub id: u64,
    pub name: String,
}

/// Select option id. Recent Paperless versions use string ids, older ones
/// address options by their index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionId {
    Index(u64),
    Key(String),
}

impl OptionId {
    pub fn to_json(&self) -> Value {
        match self {
            OptionId::Index(i) => Value::from(*i),
            OptionId::Key(k) => Value::from(k.as_str()),
        }
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionId::Index(i) => write!(f, "{i}"),
            OptionId::Key(k) => f.write_str(k),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub id: OptionId,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawSelectOption {
    Labeled { id: OptionId, label: String },
    Plain(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawExtraData {
    #[serde(default)]
    select_options: Vec<Option<RawSelectOption>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDataType {
    String,
    Url,
    Date,
    Boolean,
    Integer,
    Float,
    Monetary,
    DocumentLink,
    Select,
    LongText,
    Other(String),
}

impl From<&str> for FieldDataType {
    fn from(s: &str) -> Self {
        match s {
            "string" => FieldDataType::String,
            "url" => FieldDataType::Url,
            "date" => FieldDataType::Date,
            "boolean" => FieldDataType::Boolean,
            "integer" => FieldDataType::Integer,
            "float" => FieldDataType::Float,
            "monetary" => FieldDataType::Monetary,
            "documentlink" => FieldDataType::DocumentLink,
            "select" => FieldDataType::Select,
            "longtext" => FieldDataType::LongText,
            other => FieldDataType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FieldDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldDataType::String => "string",
            FieldDataType::Url => "url",
            FieldDataType::Date => "date",
            FieldDataType::Boolean => "boolean",
            FieldDataType::Integer => "integer",
            FieldDataType::Float => "float",
            FieldDataType::Monetary => "monetary",
            FieldDataType::DocumentLink => "documentlink",
            FieldDataType::Select => "select",
            FieldDataType::LongText => "longtext",
            FieldDataType::Other(other) => other,
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawCustomField {
    id: u64,
    name: String,
    #[serde(default)]
    data_type: String,
    #[serde(default)]
    extra_data: Option<RawExtraData>,
}

/// A custom field definition, with its options when it is a select field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawCustomField")]
pub struct RemoteCustomField {
    pub id: u64,
    pub name: String,
    pub data_type: FieldDataType,
    pub options: Vec<SelectOption>,
}

impl From<RawCustomField> for RemoteCustomField {
    fn from(raw: RawCustomField) -> Self {
        let options = raw
            .extra_data
            .unwrap_or_default()
            .select_options
            .into_iter()
            .enumerate()
            .filter_map(|(index, option)| match option? {
                RawSelectOption::Labeled { id, label } => Some(SelectOption { id, label }),
                RawSelectOption::Plain(label) => Some(SelectOption {
                    id: OptionId::Index(index as u64),
                    label,
                }),
            })
            .collect();
        Self {
            id: raw.id,
            name: raw.name,
            data_type: FieldDataType::from(raw.data_type.as_str()),
            options,
        }
    }
}

impl RemoteCustomField {
    /// Exact label match first, then case-insensitive.
    pub fn option(&self, label: &str) -> Option<&SelectOption> {
        let label = label.trim();
        self.options
            .iter()
            .find(|o| o.label == label)
            .or_else(|| self.options.iter().find(|o| o.label.eq_ignore_ascii_case(label)))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteDocument {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<u64>,
    #[serde(default)]
    pub document_type: Option<u64>,
}

impl RemoteDocument {
    /// `created_date` when the server sends it, otherwise `created`.
    pub fn created_raw(&self) -> Option<&str> {
        self.created_date
            .as_deref()
            .or(self.created.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Identifier of an asynchronous consumption task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// The upload endpoint answers with the task UUID as a JSON string.
    pub fn from_response(body: &str) -> Option<Self> {
        let trimmed = body.trim();
        let id = serde_json::from_str::<String>(trimmed)
            .unwrap_or_else(|_| trimmed.trim_matches('"').to_string());
        (!id.is_empty()).then_some(TaskId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawTask {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub related_document: Option<Value>,
    #[serde(default)]
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Started,
    Success { document_id: Option<u64> },
    Failure { reason: String },
    /// The server has no record of the task yet.
    Unknown,
}

impl TaskStatus {
    pub(crate) fn from_raw(raw: RawTask) -> Self {
        match raw.status.to_ascii_uppercase().as_str() {
            "SUCCESS" => TaskStatus::Success {
                document_id: raw.related_document.as_ref().and_then(document_id_of),
            },
            "FAILURE" | "REVOKED" => TaskStatus::Failure {
                reason: raw.result.unwrap_or_else(|| raw.status.clone()),
            },
            "STARTED" => TaskStatus::Started,
            _ => TaskStatus::Pending,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Success { .. } | TaskStatus::Failure { .. })
    }
}

fn document_id_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Everything needed for one `post_document` call.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub title: String,
    /// `YYYY-MM-DD`.
    pub created: String,
    pub document_type: Option<u64>,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldAssignment {
    pub field: u64,
    pub value: Value,
}

/// Body of the single metadata PATCH sent per document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_fields: Vec<FieldAssignment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<u64>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.custom_fields.is_empty() && self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_options_accept_both_shapes() {
        let labeled: RemoteCustomField = serde_json::from_value(json!({
            "id": 3,
            "name": "Source",
            "data_type": "select",
            "extra_data": {"select_options": [
                {"id": "aB3x", "label": "https://arxiv.org/"},
                {"id": "Zq9k", "label": "Manual"}
            ]}
        }))
        .unwrap();
        assert_eq!(labeled.data_type, FieldDataType::Select);
        assert_eq!(labeled.option("manual").unwrap().id, OptionId::Key("Zq9k".into()));

        let plain: RemoteCustomField = serde_json::from_value(json!({
            "id": 4,
            "name": "Scope",
            "data_type": "select",
            "extra_data": {"select_options": ["Research", "Industry"]}
        }))
        .unwrap();
        assert_eq!(plain.option("Industry").unwrap().id, OptionId::Index(1));
    }

    #[test]
    fn fields_without_extra_data_have_no_options() {
        let field: RemoteCustomField = serde_json::from_value(json!({
            "id": 1, "name": "Authors", "data_type": "string", "extra_data": null
        }))
        .unwrap();
        assert!(field.options.is_empty());
        assert_eq!(field.data_type, FieldDataType::String);
    }

    #[test]
    fn task_status_mapping() {
        let raw: RawTask = serde_json::from_value(json!({
            "status": "SUCCESS", "related_document": "42", "result": "Success. New document id 42 created"
        }))
        .unwrap();
        assert_eq!(TaskStatus::from_raw(raw), TaskStatus::Success { document_id: Some(42) });

        let raw: RawTask = serde_json::from_value(json!({
            "status": "FAILURE", "related_document": null, "result": "duplicate document"
        }))
        .unwrap();
        assert_eq!(
            TaskStatus::from_raw(raw),
            TaskStatus::Failure { reason: "duplicate document".into() }
        );
    }

    #[test]
    fn task_id_from_quoted_body() {
        assert_eq!(
            TaskId::from_response("\"0b1c2d3e-aaaa-bbbb-cccc-111122223333\"\n"),
            Some(TaskId("0b1c2d3e-aaaa-bbbb-cccc-111122223333".into()))
        );
        assert_eq!(TaskId::from_response("  "), None);
    }

    #[test]
    fn empty_patch_parts_are_omitted() {
        let patch = MetadataPatch {
            custom_fields: Vec::new(),
            tags: vec![7],
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"tags": [7]}));
    }
}

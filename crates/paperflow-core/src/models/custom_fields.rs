use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest keyword string written to the `Keywords` field.
pub const KEYWORDS_MAX_LEN: usize = 100;

/// Descriptive fields mirrored 1:1 onto Paperless custom fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CustomFieldName {
    Authors,
    Keywords,
    AffiliatedOrganization,
    Source,
    DownloadUrl,
    AddedVia,
    Scope,
    Theme,
    QuriskRelevance,
    ImportQuery,
}

// (variant, remote name, local name)
const FIELD_TABLE: [(CustomFieldName, &str, &str); 10] = [
    (CustomFieldName::Authors, "Authors", "authors"),
    (CustomFieldName::Keywords, "Keywords", "keywords"),
    (CustomFieldName::AffiliatedOrganization, "Affiliated-Organization", "affiliated_organization"),
    (CustomFieldName::Source, "Source", "source"),
    (CustomFieldName::DownloadUrl, "Download-URL", "download_url"),
    (CustomFieldName::AddedVia, "Added-Via", "added_via"),
    (CustomFieldName::Scope, "Scope", "scope"),
    (CustomFieldName::Theme, "oQo-Theme", "theme"),
    (CustomFieldName::QuriskRelevance, "Qurisk-Relevance", "qurisk_relevance"),
    (CustomFieldName::ImportQuery, "Import-Query", "import_query"),
];

impl CustomFieldName {
    pub fn all() -> impl Iterator<Item = CustomFieldName> {
        FIELD_TABLE.iter().map(|(name, _, _)| *name)
    }

    /// Name of the custom field definition in Paperless.
    pub fn remote_name(self) -> &'static str {
        FIELD_TABLE
            .iter()
            .find(|(name, _, _)| *name == self)
            .map(|(_, remote, _)| *remote)
            .unwrap_or_default()
    }

    pub fn local_name(self) -> &'static str {
        FIELD_TABLE
            .iter()
            .find(|(name, _, _)| *name == self)
            .map(|(_, _, local)| *local)
            .unwrap_or_default()
    }

    pub fn from_remote(remote: &str) -> Option<Self> {
        FIELD_TABLE
            .iter()
            .find(|(_, r, _)| *r == remote)
            .map(|(name, _, _)| *name)
    }

    pub fn from_local(local: &str) -> Option<Self> {
        FIELD_TABLE
            .iter()
            .find(|(_, _, l)| *l == local)
            .map(|(name, _, _)| *name)
    }

    /// Accepts either spelling; `oqo_theme` is an accepted local alias.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::from_remote(name)
            .or_else(|| Self::from_local(name))
            .or_else(|| (name == "oqo_theme").then_some(CustomFieldName::Theme))
    }
}

impl fmt::Display for CustomFieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remote_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Integer(_) => false,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Integer(n) => Value::from(*n),
            FieldValue::Text(s) => Value::from(s.as_str()),
            FieldValue::List(items) => Value::from(items.clone()),
        }
    }

    fn from_json(value: Value) -> Result<Self, Value> {
        serde_json::from_value(value.clone()).map_err(|_| value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items)
    }
}

/// Typed custom-field values keyed by the closed field set, plus a raw
/// passthrough for remote fields this build does not know about.
///
/// Serialized as one JSON object keyed by remote field names; that object is
/// the snapshot blob stored in the dedup table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomFields {
    known: BTreeMap<CustomFieldName, FieldValue>,
    raw: BTreeMap<String, Value>,
}

impl CustomFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: CustomFieldName, value: impl Into<FieldValue>) {
        self.known.insert(name, value.into());
    }

    pub fn with(mut self, name: CustomFieldName, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: CustomFieldName) -> Option<&FieldValue> {
        self.known.get(&name)
    }

    pub fn get_text(&self, name: CustomFieldName) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn remove(&mut self, name: CustomFieldName) -> Option<FieldValue> {
        self.known.remove(&name)
    }

    /// Stores a value under a remote name. Known names land in the typed map
    /// when the value has a supported shape.
    pub fn set_raw(&mut self, remote_name: &str, value: Value) {
        if value.is_null() {
            return;
        }
        if let Some(name) = CustomFieldName::lookup(remote_name) {
            match FieldValue::from_json(value) {
                Ok(typed) => {
                    self.known.insert(name, typed);
                }
                Err(value) => {
                    self.raw.insert(name.remote_name().to_string(), value);
                }
            }
        } else {
            self.raw.insert(remote_name.to_string(), value);
        }
    }

    pub fn raw(&self) -> &BTreeMap<String, Value> {
        &self.raw
    }

    pub fn known(&self) -> impl Iterator<Item = (CustomFieldName, &FieldValue)> {
        self.known.iter().map(|(name, value)| (*name, value))
    }

    /// Every entry as `(remote name, json value)`, known fields first.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.known
            .iter()
            .map(|(name, value)| (name.remote_name().to_string(), value.to_json()))
            .chain(self.raw.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.raw.is_empty()
    }

    pub fn len(&self) -> usize {
        self.known.len() + self.raw.len()
    }

    /// Drops empty strings and empty lists.
    pub fn without_empty(mut self) -> Self {
        self.known.retain(|_, value| !value.is_empty());
        self.raw.retain(|_, value| match value {
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        });
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Serialize for CustomFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in &self.known {
            map.serialize_entry(name.remote_name(), value)?;
        }
        for (name, value) in &self.raw {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CustomFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = CustomFields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of custom field names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut fields = CustomFields::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    fields.set_raw(&key, value);
                }
                Ok(fields)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(CustomFields::new())
            }
        }

        deserializer.deserialize_any(FieldsVisitor)
    }
}

/// Truncates to at most `max_chars` characters, preferring to cut at the last
/// complete comma-separated term.
pub fn clamp_keywords(keywords: &str, max_chars: usize) -> String {
    let trimmed = keywords.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    match cut.rfind(',') {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut.trim_end().to_string(),
    }
}

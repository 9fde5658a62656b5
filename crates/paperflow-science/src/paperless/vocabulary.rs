use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use paperflow_core::{CustomFieldName, CustomFields};

use crate::error::{ResolutionError, ResolutionErrors, Result};
use crate::paperless::client::DocumentStore;
use crate::paperless::types::{FieldAssignment, FieldDataType, Page, RemoteCustomField};

const AUTHORS_SEPARATOR: &str = "; ";
/// Guards against a server that keeps returning `next`.
const MAX_PAGES: u32 = 1000;

/// Name to id mappings of one remote store, as fetched by one refresh.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    tags: HashMap<String, u64>,
    document_types: HashMap<String, u64>,
    custom_fields: HashMap<String, RemoteCustomField>,
}

impl Vocabulary {
    pub fn new(
        tags: impl IntoIterator<Item = (String, u64)>,
        document_types: impl IntoIterator<Item = (String, u64)>,
        custom_fields: impl IntoIterator<Item = RemoteCustomField>,
    ) -> Self {
        Self {
            tags: tags.into_iter().collect(),
            document_types: document_types.into_iter().collect(),
            custom_fields: custom_fields.into_iter().map(|f| (f.name.clone(), f)).collect(),
        }
    }

    pub fn tag_id(&self, name: &str) -> Option<u64> {
        self.tags.get(name.trim()).copied()
    }

    pub fn document_type_id(&self, name: &str) -> Option<u64> {
        self.document_types.get(name.trim()).copied()
    }

    pub fn custom_field(&self, name: &str) -> Option<&RemoteCustomField> {
        self.custom_fields.get(name.trim())
    }

    /// Tag names, sorted.
    pub fn tag_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tags.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn tags(&self) -> Vec<(&str, u64)> {
        sorted(&self.tags)
    }

    pub fn document_types(&self) -> Vec<(&str, u64)> {
        sorted(&self.document_types)
    }

    pub fn custom_fields(&self) -> Vec<&RemoteCustomField> {
        let mut fields: Vec<&RemoteCustomField> = self.custom_fields.values().collect();
        fields.sort_by_key(|f| f.id);
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.document_types.is_empty() && self.custom_fields.is_empty()
    }
}

fn sorted(map: &HashMap<String, u64>) -> Vec<(&str, u64)> {
    let mut entries: Vec<(&str, u64)> = map.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by_key(|(_, id)| *id);
    entries
}

/// Maps human-readable tag, document type and custom field names onto the
/// ids of the remote store.
///
/// Readers always see one complete [`Vocabulary`]: `refresh` builds a new
/// one and swaps it in only once every collection has been fetched.
pub struct VocabularyResolver {
    store: Arc<dyn DocumentStore>,
    current: RwLock<Arc<Vocabulary>>,
}

impl VocabularyResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            current: RwLock::new(Arc::new(Vocabulary::default())),
        }
    }

    /// A resolver over a fixed vocabulary.
    pub fn with_vocabulary(store: Arc<dyn DocumentStore>, vocabulary: Vocabulary) -> Self {
        Self {
            store,
            current: RwLock::new(Arc::new(vocabulary)),
        }
    }

    pub async fn refresh(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let tags = fetch_all(|page| {
            let store = Arc::clone(&store);
            async move { store.list_tags(page).await }
        })
        .await?;
        let document_types = fetch_all(|page| {
            let store = Arc::clone(&store);
            async move { store.list_document_types(page).await }
        })
        .await?;
        let custom_fields = fetch_all(|page| {
            let store = Arc::clone(&store);
            async move { store.list_custom_fields(page).await }
        })
        .await?;

        let vocabulary = Vocabulary::new(
            tags.into_iter().map(|t| (t.name, t.id)),
            document_types.into_iter().map(|d| (d.name, d.id)),
            custom_fields,
        );
        tracing::info!(
            tags = vocabulary.tags.len(),
            document_types = vocabulary.document_types.len(),
            custom_fields = vocabulary.custom_fields.len(),
            "vocabulary refreshed"
        );

        let mut current = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = Arc::new(vocabulary);
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<Vocabulary> {
        let current = match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&current)
    }

    /// Splits `names` into resolved ids and names with no remote tag.
    pub fn resolve_tag_names<S: AsRef<str>>(&self, names: &[S]) -> (Vec<u64>, Vec<String>) {
        let vocabulary = self.snapshot();
        let mut ids = Vec::new();
        let mut unknown = Vec::new();
        for name in names {
            let name = name.as_ref();
            match vocabulary.tag_id(name) {
                Some(id) => {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                None => unknown.push(name.to_string()),
            }
        }
        (ids, unknown)
    }

    pub fn resolve_document_type(&self, name: &str) -> std::result::Result<u64, ResolutionError> {
        self.snapshot()
            .document_type_id(name)
            .ok_or_else(|| ResolutionError::UnknownDocumentType(name.to_string()))
    }

    /// Resolves one field to its remote id and the value to send.
    ///
    /// Select fields are looked up in their option list; every other type
    /// passes the value through, except `Authors` lists which are joined
    /// with `"; "`.
    pub fn resolve_custom_field(&self, name: &str, value: &Value) -> std::result::Result<FieldAssignment, ResolutionError> {
        resolve_in(&self.snapshot(), name, value)
    }

    /// Resolves every non-empty field, collecting all failures.
    pub fn resolve_custom_fields(&self, fields: &CustomFields) -> std::result::Result<Vec<FieldAssignment>, ResolutionErrors> {
        let vocabulary = self.snapshot();
        let mut assignments = Vec::new();
        let mut errors = ResolutionErrors::default();
        for (name, value) in fields.clone().without_empty().entries() {
            match resolve_in(&vocabulary, &name, &value) {
                Ok(assignment) => assignments.push(assignment),
                Err(e) => errors.push(e),
            }
        }
        errors.into_result(assignments)
    }
}

fn resolve_in(vocabulary: &Vocabulary, name: &str, value: &Value) -> std::result::Result<FieldAssignment, ResolutionError> {
    let field = vocabulary
        .custom_field(name)
        .ok_or_else(|| ResolutionError::UnknownField(name.to_string()))?;

    let value = if CustomFieldName::from_remote(name) == Some(CustomFieldName::Authors) {
        join_authors(value)
    } else {
        value.clone()
    };

    let value = match field.data_type {
        FieldDataType::Select => {
            let label = option_label(&value);
            let option = field.option(&label).ok_or_else(|| ResolutionError::UnknownOption {
                field: field.name.clone(),
                value: label.clone(),
            })?;
            option.id.to_json()
        }
        _ => value,
    };

    Ok(FieldAssignment { field: field.id, value })
}

fn join_authors(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let names: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|s| !s.is_empty())
                .collect();
            Value::from(names.join(AUTHORS_SEPARATOR))
        }
        other => other.clone(),
    }
}

fn option_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items.iter().map(option_label).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

async fn fetch_all<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let batch = fetch(page).await?;
        let more = batch.has_next() && !batch.results.is_empty();
        items.extend(batch.results);
        if !more || page >= MAX_PAGES {
            break;
        }
        page += 1;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use paperflow_core::CustomFieldName;

    use crate::paperless::fake::{FakeStore, field, tag};

    async fn resolver(store: FakeStore) -> VocabularyResolver {
        let resolver = VocabularyResolver::new(Arc::new(store));
        resolver.refresh().await.unwrap();
        resolver
    }

    #[tokio::test]
    async fn refresh_follows_pagination() {
        let store = FakeStore::with_page_size(2);
        store.state().tags = (1..=5).map(|i| tag(i, &format!("tag-{i}"))).collect();
        let resolver = resolver(store).await;

        assert_eq!(resolver.snapshot().tag_names().len(), 5);
        let (ids, unknown) = resolver.resolve_tag_names(&["tag-5"]);
        assert_eq!(ids, vec![5]);
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn known_and_unknown_tags_are_split() {
        let resolver = resolver(FakeStore::quantum()).await;
        for name in resolver.snapshot().tag_names() {
            let (ids, unknown) = resolver.resolve_tag_names(&[name.as_str()]);
            assert_eq!(ids.len(), 1);
            assert!(unknown.is_empty());
        }

        let (ids, unknown) = resolver.resolve_tag_names(&["Quantum Computing", "Blockchain"]);
        assert_eq!(ids, vec![7]);
        assert_eq!(unknown, vec!["Blockchain"]);
    }

    #[tokio::test]
    async fn authors_list_is_joined() {
        let resolver = resolver(FakeStore::quantum()).await;

        let joined = resolver
            .resolve_custom_field("Authors", &json!(["A. Smith", "B. Lee"]))
            .unwrap();
        assert_eq!(joined.field, 1);
        assert_eq!(joined.value, json!("A. Smith; B. Lee"));

        let plain = resolver
            .resolve_custom_field("Authors", &json!("A. Smith; B. Lee"))
            .unwrap();
        assert_eq!(plain.value, json!("A. Smith; B. Lee"));
    }

    #[tokio::test]
    async fn select_values_become_option_ids() {
        let resolver = resolver(FakeStore::quantum()).await;

        let relevance = resolver.resolve_custom_field("Qurisk-Relevance", &json!(4)).unwrap();
        assert_eq!(relevance, FieldAssignment { field: 9, value: json!("r4") });

        let err = resolver
            .resolve_custom_field("Qurisk-Relevance", &json!(9))
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnknownOption { field: "Qurisk-Relevance".into(), value: "9".into() }
        );
    }

    #[tokio::test]
    async fn every_failure_is_collected() {
        let store = FakeStore::quantum();
        store.state().custom_fields.push(field(20, "Scope", "select"));
        let resolver = resolver(store).await;

        let mut fields = CustomFields::new()
            .with(CustomFieldName::Keywords, "qkd, pqc")
            .with(CustomFieldName::Theme, "Post-Quantum")
            .with(CustomFieldName::Scope, "Europe");
        fields.set_raw("Reviewer", json!("Dr. Who"));

        let errors = resolver.resolve_custom_fields(&fields).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| *e == ResolutionError::UnknownField("oQo-Theme".into())));
        assert!(errors.iter().any(|e| *e == ResolutionError::UnknownField("Reviewer".into())));
        assert!(errors.iter().any(|e| matches!(e, ResolutionError::UnknownOption { field, .. } if field == "Scope")));
    }

    #[tokio::test]
    async fn empty_fields_are_not_resolved() {
        let resolver = resolver(FakeStore::quantum()).await;
        let fields = CustomFields::new()
            .with(CustomFieldName::Keywords, "qkd")
            .with(CustomFieldName::Theme, "");
        let assignments = resolver.resolve_custom_fields(&fields).unwrap();
        assert_eq!(assignments, vec![FieldAssignment { field: 2, value: json!("qkd") }]);
    }

    #[tokio::test]
    async fn unknown_document_type() {
        let resolver = resolver(FakeStore::quantum()).await;
        assert_eq!(resolver.resolve_document_type("Scientific-Paper"), Ok(1));
        assert_eq!(
            resolver.resolve_document_type("Patent"),
            Err(ResolutionError::UnknownDocumentType("Patent".into()))
        );
    }

    #[tokio::test]
    async fn refresh_replaces_the_whole_vocabulary() {
        let store = Arc::new(FakeStore::quantum());
        let resolver = VocabularyResolver::new(store.clone());
        resolver.refresh().await.unwrap();
        let before = resolver.snapshot();

        store.state().tags = vec![tag(30, "Photonics")];
        resolver.refresh().await.unwrap();

        assert_eq!(before.tag_id("Quantum Computing"), Some(7));
        assert_eq!(resolver.snapshot().tag_id("Quantum Computing"), None);
        assert_eq!(resolver.snapshot().tag_id("Photonics"), Some(30));
    }
}

//! In-memory [`DocumentStore`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{Result, ScienceError};
use crate::paperless::client::DocumentStore;
use crate::paperless::types::{
    DocumentUpload, MetadataPatch, Page, RemoteCustomField, RemoteDocument, RemoteDocumentType,
    RemoteTag, TaskId, TaskStatus,
};

#[derive(Default)]
pub(crate) struct FakeState {
    pub tags: Vec<RemoteTag>,
    pub document_types: Vec<RemoteDocumentType>,
    pub custom_fields: Vec<RemoteCustomField>,
    pub documents: HashMap<u64, RemoteDocument>,
    pub uploads: Vec<DocumentUpload>,
    pub patches: Vec<(u64, MetadataPatch)>,
    pub tasks: HashMap<String, TaskStatus>,
    pub list_calls: u32,
    pub fail_patches: bool,
    next_id: u64,
}

/// Pages are `page_size` items long; uploads become documents immediately.
pub(crate) struct FakeStore {
    pub state: Mutex<FakeState>,
    page_size: usize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 1,
                ..FakeState::default()
            }),
            page_size,
        }
    }

    /// The vocabulary used across the workflow tests.
    pub fn quantum() -> Self {
        let store = Self::new();
        {
            let mut state = store.state();
            state.tags = vec![tag(7, "Quantum Computing"), tag(8, "Cryptography")];
            state.document_types = vec![
                RemoteDocumentType { id: 1, name: "Scientific-Paper".into() },
                RemoteDocumentType { id: 2, name: "News-Article".into() },
            ];
            state.custom_fields = ["Authors", "Keywords", "Source", "Download-URL", "Added-Via", "Import-Query"]
                .iter()
                .enumerate()
                .map(|(i, name)| field(i as u64 + 1, name, "string"))
                .chain(std::iter::once(
                    serde_json::from_value(json!({
                        "id": 9,
                        "name": "Qurisk-Relevance",
                        "data_type": "select",
                        "extra_data": {"select_options": [
                            {"id": "r1", "label": "1"}, {"id": "r2", "label": "2"},
                            {"id": "r3", "label": "3"}, {"id": "r4", "label": "4"},
                            {"id": "r5", "label": "5"}
                        ]}
                    }))
                    .unwrap(),
                ))
                .collect();
        }
        store
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn insert_document(&self, title: &str, created: &str, content: &str) -> u64 {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        state.documents.insert(
            id,
            RemoteDocument {
                id,
                title: title.to_string(),
                created_date: Some(created.to_string()),
                created: None,
                content: content.to_string(),
                tags: Vec::new(),
                document_type: None,
            },
        );
        id
    }

    fn page<T: Clone>(&self, items: &[T], page: u32) -> Page<T> {
        let start = (page.max(1) as usize - 1) * self.page_size;
        let results: Vec<T> = items.iter().skip(start).take(self.page_size).cloned().collect();
        let next = (start + results.len() < items.len()).then(|| format!("page={}", page + 1));
        Page {
            count: items.len() as u64,
            next,
            results,
        }
    }
}

pub(crate) fn tag(id: u64, name: &str) -> RemoteTag {
    RemoteTag { id, name: name.to_string() }
}

pub(crate) fn field(id: u64, name: &str, data_type: &str) -> RemoteCustomField {
    serde_json::from_value(json!({"id": id, "name": name, "data_type": data_type})).unwrap()
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn list_tags(&self, page: u32) -> Result<Page<RemoteTag>> {
        let tags = {
            let mut state = self.state();
            state.list_calls += 1;
            state.tags.clone()
        };
        Ok(self.page(&tags, page))
    }

    async fn list_document_types(&self, page: u32) -> Result<Page<RemoteDocumentType>> {
        let types = self.state().document_types.clone();
        Ok(self.page(&types, page))
    }

    async fn list_custom_fields(&self, page: u32) -> Result<Page<RemoteCustomField>> {
        let fields = self.state().custom_fields.clone();
        Ok(self.page(&fields, page))
    }

    async fn upload(&self, upload: DocumentUpload) -> Result<TaskId> {
        let content = String::from_utf8_lossy(&upload.bytes).into_owned();
        let id = self.insert_document(&upload.title, &upload.created, &content);
        let mut state = self.state();
        let task = TaskId(format!("task-{id}"));
        state
            .tasks
            .insert(task.0.clone(), TaskStatus::Success { document_id: Some(id) });
        state.uploads.push(upload);
        Ok(task)
    }

    async fn task_status(&self, task: &TaskId) -> Result<TaskStatus> {
        Ok(self
            .state()
            .tasks
            .get(task.as_str())
            .cloned()
            .unwrap_or(TaskStatus::Unknown))
    }

    async fn get_document(&self, id: u64) -> Result<RemoteDocument> {
        self.state()
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| ScienceError::DocumentNotFound(id.to_string()))
    }

    async fn find_documents_by_title(&self, title: &str) -> Result<Vec<RemoteDocument>> {
        let state = self.state();
        let mut found: Vec<RemoteDocument> = state
            .documents
            .values()
            .filter(|d| d.title.eq_ignore_ascii_case(title))
            .cloned()
            .collect();
        found.sort_by_key(|d| d.id);
        Ok(found)
    }

    async fn patch_document(&self, id: u64, patch: &MetadataPatch) -> Result<()> {
        let mut state = self.state();
        if state.fail_patches {
            return Err(ScienceError::UpdateFailed {
                document_id: id,
                reason: "HTTP 500: server error".into(),
            });
        }
        if let Some(document) = state.documents.get_mut(&id)
            && !patch.tags.is_empty()
        {
            document.tags = patch.tags.clone();
        }
        state.patches.push((id, patch.clone()));
        Ok(())
    }
}

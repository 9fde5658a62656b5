use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;

use paperflow_core::config::PaperlessConfig;

use crate::error::{Result, ScienceError};
use crate::http::{HostThrottle, RateLimitedClient, auth_headers};
use crate::paperless::types::{
    DocumentUpload, MetadataPatch, Page, RawTask, RemoteCustomField, RemoteDocument,
    RemoteDocumentType, RemoteTag, TaskId, TaskStatus,
};

/// The remote document store, as seen by the pipeline and the merge step.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_tags(&self, page: u32) -> Result<Page<RemoteTag>>;

    async fn list_document_types(&self, page: u32) -> Result<Page<RemoteDocumentType>>;

    async fn list_custom_fields(&self, page: u32) -> Result<Page<RemoteCustomField>>;

    /// Hands the binary over for asynchronous consumption.
    async fn upload(&self, upload: DocumentUpload) -> Result<TaskId>;

    async fn task_status(&self, task: &TaskId) -> Result<TaskStatus>;

    async fn get_document(&self, id: u64) -> Result<RemoteDocument>;

    /// Documents whose title matches exactly, ignoring case.
    async fn find_documents_by_title(&self, title: &str) -> Result<Vec<RemoteDocument>>;

    /// One PATCH call. Not retried.
    async fn patch_document(&self, id: u64, patch: &MetadataPatch) -> Result<()>;
}

pub struct PaperlessClient {
    client: RateLimitedClient,
    base_url: String,
    page_size: u32,
}

impl PaperlessClient {
    pub fn new(config: &PaperlessConfig, base_url: &str, token: &str, throttle: HostThrottle, user_agent: &str) -> Result<Self> {
        Self::with_params(
            base_url,
            token,
            Duration::from_millis(config.min_interval_ms),
            config.page_size,
            throttle,
            user_agent,
        )
    }

    pub fn with_params(
        base_url: &str,
        token: &str,
        min_interval: Duration,
        page_size: u32,
        throttle: HostThrottle,
        user_agent: &str,
    ) -> Result<Self> {
        let headers = auth_headers("Token", token)?;
        let client = RateLimitedClient::with_headers(throttle, min_interval, 3, user_agent, headers)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn list<T: DeserializeOwned>(&self, collection: &str, page: u32) -> Result<Page<T>> {
        let url = self.url(&format!("{collection}/"));
        self.client
            .get_json_with_query(
                &url,
                &[
                    ("page", page.max(1).to_string()),
                    ("page_size", self.page_size.to_string()),
                    ("full_perms", "true".to_string()),
                ],
            )
            .await
    }
}

#[async_trait]
impl DocumentStore for PaperlessClient {
    async fn list_tags(&self, page: u32) -> Result<Page<RemoteTag>> {
        self.list("tags", page).await
    }

    async fn list_document_types(&self, page: u32) -> Result<Page<RemoteDocumentType>> {
        self.list("document_types", page).await
    }

    async fn list_custom_fields(&self, page: u32) -> Result<Page<RemoteCustomField>> {
        self.list("custom_fields", page).await
    }

    async fn upload(&self, upload: DocumentUpload) -> Result<TaskId> {
        let title = upload.title.clone();
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)
            .map_err(|e| ScienceError::UploadFailed {
                title: title.clone(),
                reason: format!("invalid mime type: {e}"),
            })?;
        let mut form = Form::new()
            .text("title", upload.title)
            .text("created", upload.created);
        if let Some(document_type) = upload.document_type {
            form = form.text("document_type", document_type.to_string());
        }
        form = form.part("document", part);

        let body = self
            .client
            .post_multipart(&self.url("documents/post_document/"), form)
            .await
            .map_err(|e| ScienceError::UploadFailed {
                title: title.clone(),
                reason: e.to_string(),
            })?;

        let task = TaskId::from_response(&body).ok_or_else(|| ScienceError::UploadFailed {
            title: title.clone(),
            reason: "no task id in response".to_string(),
        })?;
        tracing::info!(%title, task = %task, "document handed to paperless");
        Ok(task)
    }

    async fn task_status(&self, task: &TaskId) -> Result<TaskStatus> {
        let tasks: Vec<RawTask> = self
            .client
            .get_json_with_query(&self.url("tasks/"), &[("task_id", task.0.clone())])
            .await?;
        Ok(tasks
            .into_iter()
            .next()
            .map(TaskStatus::from_raw)
            .unwrap_or(TaskStatus::Unknown))
    }

    async fn get_document(&self, id: u64) -> Result<RemoteDocument> {
        let url = self.url(&format!("documents/{id}/"));
        match self.client.get_json(&url).await {
            Err(ScienceError::ApiError(_, message)) if message.starts_with("HTTP 404") => {
                Err(ScienceError::DocumentNotFound(id.to_string()))
            }
            other => other,
        }
    }

    async fn find_documents_by_title(&self, title: &str) -> Result<Vec<RemoteDocument>> {
        let page: Page<RemoteDocument> = self
            .client
            .get_json_with_query(
                &self.url("documents/"),
                &[
                    ("title__iexact", title.to_string()),
                    ("page_size", self.page_size.to_string()),
                ],
            )
            .await?;
        Ok(page.results)
    }

    async fn patch_document(&self, id: u64, patch: &MetadataPatch) -> Result<()> {
        let url = format!("{}?full_perms=true", self.url(&format!("documents/{id}/")));
        let _: Value = self
            .client
            .patch_json(&url, patch)
            .await
            .map_err(|e| ScienceError::UpdateFailed {
                document_id: id,
                reason: e.to_string(),
            })?;
        tracing::debug!(document_id = id, tags = patch.tags.len(), fields = patch.custom_fields.len(), "metadata patched");
        Ok(())
    }
}

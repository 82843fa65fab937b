//! Document store collaborator — client folder browsing and document reads.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::DocsConfig;
use crate::error::ServiceError;

/// One entry in a folder listing.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderEntry {
    pub name: String,
    pub id: String,
    /// "folder" or "document".
    pub kind: String,
    /// Browser link for the reviewer notification.
    #[serde(default)]
    pub link: Option<String>,
}

impl FolderEntry {
    pub fn is_folder(&self) -> bool {
        self.kind == "folder"
    }

    pub fn is_document(&self) -> bool {
        self.kind == "document"
    }
}

/// Folder browsing and document reading.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List the entries directly under a folder.
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<FolderEntry>, ServiceError>;

    /// Read the full text of a document.
    async fn read_document(&self, document_id: &str) -> Result<String, ServiceError>;
}

/// HTTP client for a token-authenticated document API.
pub struct HttpDocumentStore {
    http: reqwest::Client,
    base_url: String,
    token: secrecy::SecretString,
}

impl HttpDocumentStore {
    pub fn new(config: &DocsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    entries: Vec<FolderEntry>,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    content: String,
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<FolderEntry>, ServiceError> {
        let response = self
            .http
            .get(format!("{}/folders/{}/entries", self.base_url, folder_id))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| ServiceError::DocumentStore(e.to_string()))?
            .error_for_status()
            .map_err(|e| ServiceError::DocumentStore(e.to_string()))?;

        let parsed: ListResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::DocumentStore(format!("malformed listing: {e}")))?;
        Ok(parsed.entries)
    }

    async fn read_document(&self, document_id: &str) -> Result<String, ServiceError> {
        let response = self
            .http
            .get(format!("{}/documents/{}", self.base_url, document_id))
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| ServiceError::DocumentStore(e.to_string()))?
            .error_for_status()
            .map_err(|e| ServiceError::DocumentStore(e.to_string()))?;

        let parsed: DocumentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::DocumentStore(format!("malformed document: {e}")))?;
        Ok(parsed.content)
    }
}

/// Fallback when the document store is not configured.
pub struct UnavailableDocumentStore;

#[async_trait]
impl DocumentStore for UnavailableDocumentStore {
    async fn list_folder(&self, _folder_id: &str) -> Result<Vec<FolderEntry>, ServiceError> {
        Err(ServiceError::NotConfigured("document store".into()))
    }

    async fn read_document(&self, _document_id: &str) -> Result<String, ServiceError> {
        Err(ServiceError::NotConfigured("document store".into()))
    }
}

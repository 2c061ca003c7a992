//! Out-of-band document storage
//!
//! Each document owns a flat map of string keys to string values. Blocks are
//! written once under their derived key and never rewritten or deleted here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::{StorageBackend, StorageConfig};
use crate::document::DocumentId;
use crate::error::{Result, SplotError};

/// Associative store keyed by document id
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check whether the document exists
    async fn document_exists(&self, document: DocumentId) -> Result<bool>;

    /// Create an empty document, a no-op when it already exists
    async fn create_document(&self, document: DocumentId) -> Result<()>;

    /// Insert a value under a key that must not exist yet
    async fn insert_meta(&self, document: DocumentId, key: &str, value: &str) -> Result<()>;

    /// Read a value, `None` when the document or key is absent
    async fn get_meta(&self, document: DocumentId, key: &str) -> Result<Option<String>>;

    /// List keys stored on a document
    async fn meta_keys(&self, document: DocumentId) -> Result<Vec<String>>;

    /// Backend name for logging
    fn backend_name(&self) -> &str;
}

/// Open the store described by the configuration
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::JsonDir => {
            let directory = config.directory.clone().ok_or_else(|| {
                SplotError::config("storage.directory is required for the json_dir backend")
            })?;
            Arc::new(JsonDirStore::open(directory).await?)
        }
    };

    for raw in &config.documents {
        let document = DocumentId::new(*raw)
            .ok_or_else(|| SplotError::config("storage.documents must not contain 0"))?;
        store.create_document(document).await?;
    }

    tracing::info!(
        "Opened {} store with {} seeded documents",
        store.backend_name(),
        config.documents.len()
    );
    Ok(store)
}

fn duplicate_key(document: DocumentId, key: &str) -> SplotError {
    SplotError::storage(format!(
        "Key {} already exists on document {}",
        key, document
    ))
}

fn missing_document(document: DocumentId) -> SplotError {
    SplotError::not_found(format!("Document {} does not exist", document))
}

/// Process-local store
pub struct InMemoryStore {
    documents: RwLock<HashMap<DocumentId, HashMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store with the given documents already present
    pub async fn with_documents(documents: impl IntoIterator<Item = DocumentId>) -> Self {
        let store = Self::new();
        {
            let mut docs = store.documents.write().await;
            for document in documents {
                docs.entry(document).or_default();
            }
        }
        store
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn document_exists(&self, document: DocumentId) -> Result<bool> {
        Ok(self.documents.read().await.contains_key(&document))
    }

    async fn create_document(&self, document: DocumentId) -> Result<()> {
        self.documents.write().await.entry(document).or_default();
        Ok(())
    }

    async fn insert_meta(&self, document: DocumentId, key: &str, value: &str) -> Result<()> {
        let mut documents = self.documents.write().await;
        let meta = documents
            .get_mut(&document)
            .ok_or_else(|| missing_document(document))?;

        if meta.contains_key(key) {
            return Err(duplicate_key(document, key));
        }
        meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_meta(&self, document: DocumentId, key: &str) -> Result<Option<String>> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&document)
            .and_then(|meta| meta.get(key))
            .cloned())
    }

    async fn meta_keys(&self, document: DocumentId) -> Result<Vec<String>> {
        let documents = self.documents.read().await;
        let mut keys: Vec<String> = documents
            .get(&document)
            .map(|meta| meta.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DocumentFile {
    meta: BTreeMap<String, String>,
}

/// One JSON file per document inside a directory
pub struct JsonDirStore {
    directory: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonDirStore {
    /// Open (and create if needed) the storage directory
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await.map_err(|e| {
            SplotError::storage(format!(
                "Failed to create storage directory {}: {}",
                directory.display(),
                e
            ))
        })?;

        Ok(Self {
            directory,
            write_lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn document_path(&self, document: DocumentId) -> PathBuf {
        self.directory.join(format!("{}.json", document))
    }

    async fn read_document(&self, document: DocumentId) -> Result<Option<DocumentFile>> {
        match tokio::fs::read(self.document_path(document)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // Write to a sibling temp file first so a crash never leaves a truncated document.
    async fn write_document(&self, document: DocumentId, file: &DocumentFile) -> Result<()> {
        let path = self.document_path(document);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(file)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonDirStore {
    async fn document_exists(&self, document: DocumentId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.document_path(document)).await?)
    }

    async fn create_document(&self, document: DocumentId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read_document(document).await?.is_none() {
            self.write_document(document, &DocumentFile::default())
                .await?;
            tracing::debug!("Created document {} in {}", document, self.directory.display());
        }
        Ok(())
    }

    async fn insert_meta(&self, document: DocumentId, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self
            .read_document(document)
            .await?
            .ok_or_else(|| missing_document(document))?;

        if file.meta.contains_key(key) {
            return Err(duplicate_key(document, key));
        }
        file.meta.insert(key.to_string(), value.to_string());
        self.write_document(document, &file).await
    }

    async fn get_meta(&self, document: DocumentId, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_document(document)
            .await?
            .and_then(|mut file| file.meta.remove(key)))
    }

    async fn meta_keys(&self, document: DocumentId) -> Result<Vec<String>> {
        Ok(self
            .read_document(document)
            .await?
            .map(|file| file.meta.into_keys().collect())
            .unwrap_or_default())
    }

    fn backend_name(&self) -> &str {
        "json_dir"
    }
}

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use crate::error::{EntityKind, KnownError, Result};
use crate::model::{Document, Folder};

/// Folder persistence, scoped to a user. Implementations decide ordering of
/// `list_folders`; callers may only assume it is stable between writes.
#[async_trait]
pub trait FolderStore: Send + Sync {
    /// Create and persist a folder, returning the canonical record
    /// (the generated identifier is authoritative).
    async fn create_folder(&self, user_id: &str, name: &str) -> Result<Folder>;

    /// All folders with `created_by == user_id`, storage insertion order.
    async fn list_folders(&self, user_id: &str) -> Result<Vec<Folder>>;

    /// Delete a folder and cascade-delete its documents. A document never
    /// outlives its folder.
    async fn delete_folder(&self, user_id: &str, folder_id: &str) -> Result<()>;
}

/// Document persistence, scoped to a folder.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, folder_id: &str, name: &str, content: &str)
        -> Result<Document>;

    async fn list_by_folder(&self, folder_id: &str) -> Result<Vec<Document>>;

    /// Explicit optional lookup: `Ok(None)` is the normal miss, not an error.
    async fn get_by_id(&self, doc_id: &str) -> Result<Option<Document>>;
}

/// In-memory store backing both traits. Per-user and per-folder sequences
/// keep insertion order; the id map gives O(1) document lookup.
pub struct MemoryStore {
    folders: DashMap<String, Vec<Folder>>,
    folder_docs: DashMap<String, Vec<String>>,
    docs_by_id: DashMap<String, Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            folders: DashMap::new(),
            folder_docs: DashMap::new(),
            docs_by_id: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FolderStore for MemoryStore {
    async fn create_folder(&self, user_id: &str, name: &str) -> Result<Folder> {
        let folder = Folder::new(user_id, name);
        self.folders
            .entry(user_id.to_string())
            .or_default()
            .push(folder.clone());
        Ok(folder)
    }

    async fn list_folders(&self, user_id: &str) -> Result<Vec<Folder>> {
        Ok(self
            .folders
            .get(user_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn delete_folder(&self, user_id: &str, folder_id: &str) -> Result<()> {
        let removed = {
            let mut entry = self
                .folders
                .get_mut(user_id)
                .ok_or_else(|| KnownError::not_found(EntityKind::Folder, folder_id))?;
            let before = entry.len();
            entry.retain(|f| f.id != folder_id);
            before != entry.len()
        };
        if !removed {
            return Err(KnownError::not_found(EntityKind::Folder, folder_id));
        }
        // Cascade: drop the folder's document sequence and every record in it.
        if let Some((_, doc_ids)) = self.folder_docs.remove(folder_id) {
            for doc_id in doc_ids {
                self.docs_by_id.remove(&doc_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(
        &self,
        folder_id: &str,
        name: &str,
        content: &str,
    ) -> Result<Document> {
        let doc = Document::new(folder_id, name, content);
        self.folder_docs
            .entry(folder_id.to_string())
            .or_default()
            .push(doc.id.clone());
        self.docs_by_id.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn list_by_folder(&self, folder_id: &str) -> Result<Vec<Document>> {
        let ids = self
            .folder_docs
            .get(folder_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.docs_by_id.get(id).map(|d| d.clone()))
            .collect())
    }

    async fn get_by_id(&self, doc_id: &str) -> Result<Option<Document>> {
        Ok(self.docs_by_id.get(doc_id).map(|d| d.clone()))
    }
}

pub const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Bounded retry with doubling backoff for transient persistence failures.
/// Non-transient errors (not-found, auth) pass through on the first attempt.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < RETRY_ATTEMPTS => {
                warn!(op = op_name, attempt, error = %err, "transient store failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Request-level deadline around a store or filesystem call. An elapsed
/// deadline surfaces as a persistence failure, not a hang.
pub async fn with_deadline<T, Fut>(op_name: &str, deadline: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(KnownError::Persistence(format!(
            "{} exceeded {}ms deadline",
            op_name,
            deadline.as_millis()
        ))),
    }
}

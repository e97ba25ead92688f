use serde::Serialize;

use crate::error::{EntityKind, KnownError, Result};
use crate::model::{Document, Folder};
use crate::store::DocumentStore;

/// Explicit result of a folder lookup. Callers must handle the `Missing`
/// branch; there is no path from a missing folder to a document fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FolderLookup {
    Found(Folder),
    Missing,
}

pub fn lookup_folder(folders: &[Folder], folder_id: &str) -> FolderLookup {
    match folders.iter().find(|f| f.id == folder_id) {
        Some(folder) => FolderLookup::Found(folder.clone()),
        None => FolderLookup::Missing,
    }
}

/// Per-request view state derived from the catch-all path segments.
/// Never persisted; recomputed fresh on every navigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub active_folder: Option<Folder>,
    pub active_docs: Option<Vec<Document>>,
    pub active_doc: Option<Document>,
}

/// The three tiers of the selection machine, driven purely by segment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    Empty,
    FolderSelected,
    DocumentSelected,
}

impl SelectionState {
    pub fn tier(&self) -> SelectionTier {
        if self.active_doc.is_some() {
            SelectionTier::DocumentSelected
        } else if self.active_folder.is_some() {
            SelectionTier::FolderSelected
        } else {
            SelectionTier::Empty
        }
    }
}

/// Resolve catch-all path segments against the user's folder collection.
///
/// - no segments: all-none state;
/// - `[folder_id]`: the folder must exist in `folders`, and its documents are
///   loaded;
/// - `[folder_id, doc_id]`: additionally the document is fetched by id.
///
/// Folder resolution always completes before document resolution is
/// attempted. Anything beyond two segments does not name a reachable state
/// and is rejected as not found.
pub async fn resolve_selection(
    segments: Option<&[String]>,
    folders: &[Folder],
    docs: &dyn DocumentStore,
) -> Result<SelectionState> {
    let segments = segments.unwrap_or_default();
    if segments.is_empty() {
        return Ok(SelectionState::default());
    }
    if segments.len() > 2 {
        return Err(KnownError::not_found(EntityKind::Folder, segments.join("/")));
    }

    let folder = match lookup_folder(folders, &segments[0]) {
        FolderLookup::Found(folder) => folder,
        FolderLookup::Missing => {
            return Err(KnownError::not_found(EntityKind::Folder, &segments[0]))
        }
    };
    let active_docs = docs.list_by_folder(&folder.id).await?;

    let mut state = SelectionState {
        active_folder: Some(folder),
        active_docs: Some(active_docs),
        active_doc: None,
    };

    if let Some(doc_id) = segments.get(1) {
        let doc = docs
            .get_by_id(doc_id)
            .await?
            .ok_or_else(|| KnownError::not_found(EntityKind::Document, doc_id))?;
        state.active_doc = Some(doc);
    }

    Ok(state)
}

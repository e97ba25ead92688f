use chrono::Utc;
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

/// Folder and document identifiers are 12-character random strings.
/// Collision probability is negligible at this length for per-user
/// collection sizes.
pub const ID_LEN: usize = 12;

pub fn generate_id() -> String {
    nanoid!(ID_LEN)
}

fn now_string() -> String {
    Utc::now().to_rfc3339()
}

/// A user-owned folder. Folders do not nest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub created_by: String,
    pub name: String,
    pub created_at: String,
}

impl Folder {
    /// Build a new folder record with a fresh identifier and creation stamp.
    /// Duplicate names are allowed; identity lives in `id` alone.
    pub fn new(created_by: &str, name: &str) -> Self {
        Folder {
            id: generate_id(),
            created_by: created_by.to_string(),
            name: name.to_string(),
            created_at: now_string(),
        }
    }
}

/// A document owned by exactly one folder. Lifecycle is tied to the folder:
/// deleting the folder deletes its documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub content: String,
    pub created_at: String,
}

impl Document {
    pub fn new(folder_id: &str, name: &str, content: &str) -> Self {
        Document {
            id: generate_id(),
            folder_id: folder_id.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            created_at: now_string(),
        }
    }
}

use std::fmt;

use thiserror::Error;

pub type Result<T, E = KnownError> = std::result::Result<T, E>;

/// Failure taxonomy shared by the stores, the route resolver, and the blog
/// pipeline. Every lookup miss is a typed `NotFound`, never a downstream
/// dereference of a missing record.
#[derive(Debug, Error)]
pub enum KnownError {
    /// Backing store or filesystem unreachable, or a write was rejected.
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// No valid session on a protected route.
    #[error("authentication required")]
    AuthRequired,

    /// Raw post text whose front matter header cannot be parsed.
    #[error("invalid front matter: {0}")]
    FrontMatter(String),
}

impl KnownError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        KnownError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether a bounded retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(self, KnownError::Persistence(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Folder,
    Document,
    Post,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Folder => write!(f, "folder"),
            EntityKind::Document => write!(f, "document"),
            EntityKind::Post => write!(f, "post"),
        }
    }
}

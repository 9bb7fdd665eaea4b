use serde::{Deserialize, Serialize};

/// Emitted by a document store after a commit, one per touched document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEvent {
    DocumentSaved { collection: String, doc_id: String },
    DocumentDeleted { collection: String, doc_id: String },
}

impl ChangeEvent {
    pub fn collection(&self) -> &str {
        match self {
            ChangeEvent::DocumentSaved { collection, .. }
            | ChangeEvent::DocumentDeleted { collection, .. } => collection,
        }
    }

    pub fn doc_id(&self) -> &str {
        match self {
            ChangeEvent::DocumentSaved { doc_id, .. }
            | ChangeEvent::DocumentDeleted { doc_id, .. } => doc_id,
        }
    }
}

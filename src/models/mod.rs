//! Domain models for resources and their replicated document views.

mod content_status;
mod doc_id;
mod index_document;
mod invalid_reason;
mod resource;

pub use content_status::{ContentStatus, ContentStatusCode};
pub use doc_id::{DocIdRange, DocIdRow};
pub use index_document::{is_invalid_index_path, IndexDocument, IndexDocumentSet};
pub use invalid_reason::InvalidReason;
pub use resource::{Resource, ResourceStatus};

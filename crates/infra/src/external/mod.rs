//! Adapters for services we call out to: mail delivery and object storage,
//! plus the document pipeline built on them.

pub mod documents;
pub mod email;
pub mod storage;

pub use documents::{
    CompanyProfile, DocumentError, DocumentService, EmailedDocument, RenderedDocument,
    invoice_view, purchase_order_view, quote_view,
};
pub use email::{
    EmailAttachment, EmailError, EmailMessage, EmailReceipt, EmailSender, InMemoryOutbox,
    SendGridSender,
};
pub use storage::{InMemoryObjectStore, LocalFsObjectStore, ObjectStore, StorageError, StoredObject};

pub mod embed;
pub mod pending;

pub use embed::{download_link, AttachmentRef, AttachmentSlot, DownloadLink, EmbeddedFile};
pub use pending::{ingest_path, PendingUploads};

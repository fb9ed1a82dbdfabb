// Recording artifacts on disk
//
// Naming of video files, the per-recording annotation sidecar, and a
// catalog that lists and filters what has been recorded.

pub mod catalog;
pub mod metadata;
pub mod naming;

pub use catalog::{Catalog, CatalogQuery, CatalogSummary, RecordingEntry, VIDEO_EXTENSIONS};
pub use metadata::{MetadataRecord, MetadataStore};
pub use naming::{ArtifactKey, validate_tracking_number};

pub mod recorder;
pub mod storage;

pub use recorder::{
    Recorder, RecorderBuilder, RecorderConfig, RecorderError, RecorderEvent, RecorderEvents,
    RecorderResult,
};
pub use storage::{ArtifactKey, Catalog, CatalogQuery, MetadataRecord, MetadataStore};

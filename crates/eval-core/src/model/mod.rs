//! Modelos del run (RunContext, RunStatus, TimelineEvent, ResultRecord,...)

pub mod artifact;
pub mod context;
pub mod features;
pub mod record;
pub mod status;
pub mod timeline;

pub use artifact::{Artifact, ArtifactKind};
pub use context::{RunContext, RunIdentity};
pub use features::{FeatureValue, Features};
pub use record::{DatasetRow, ResultRecord, RowIndex};
pub use status::RunStatus;
pub use timeline::TimelineEvent;

/// Mapeo nombre de métrica -> valor (orden de inserción preservado).
pub type Metrics = indexmap::IndexMap<String, serde_json::Value>;

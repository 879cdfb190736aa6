//! eval-core: núcleo de ejecución de jobs de evaluación (predict -> evaluate)
pub mod constants;
pub mod dataset;
pub mod errors;
pub mod hashing;
pub mod job;
pub mod journal;
pub mod model;
pub mod pipeline;
pub mod store;

pub use dataset::{Dataset, DatasetOpener, DatasetUri, InMemoryDatasetCatalog, SessionCoordinator};
pub use errors::{CallbackError, CallbackResult, EvalError};
pub use job::{EvaluateOptions, InMemoryJobHost, JobGraph, JobGraphBuilder, JobHost, PredictOptions, StageRegistration,
              StageRole};
pub use journal::{InMemoryStatusStore, InMemoryTimeline, StatusJournal, StatusStore, TimelineWriter};
pub use model::{Artifact, ArtifactKind, DatasetRow, FeatureValue, Features, Metrics, ResultRecord, RowIndex, RunContext,
                RunIdentity, RunStatus, TimelineEvent};
pub use pipeline::{ErrorPolicy, EvaluateInput, PipelineConfig, PipelineHandler, PipelineHandlerBuilder, PredictBatch,
                   PredictInput, PredictSummary, Service, StepOutcome};
pub use store::{DataStore, Evaluation, EvaluationLogStore, InMemoryDataStore, LogStoreRegistry, SummaryArgs};

//! PipelineHandler: ejecución de las fases predict y evaluate de un worker.

pub mod callbacks;
pub mod config;
pub mod handler;
pub mod policy;
pub mod service;

pub use callbacks::{EvaluateInput, EvaluateRole, Evaluator, PredictBatch, PredictInput, PredictRole, Predictor, RoleSlot};
pub use config::PipelineConfig;
pub use handler::{PipelineHandler, PipelineHandlerBuilder, PredictSummary, StepOutcome};
pub use policy::ErrorPolicy;
pub use service::{ApiFn, ApiSpec, Service, ServiceHost};

//! Grafo de job de dos fases (predict -> evaluate).
//!
//! Se construye al definir el job y lo ejecuta un scheduler externo: este
//! módulo solo valida, ordena y registra los stages.

pub mod builder;
pub mod graph;
pub mod host;
pub mod stage;

pub use builder::JobGraphBuilder;
pub use graph::JobGraph;
pub use host::{InMemoryJobHost, JobHost, StageRegistration};
pub use stage::{EvaluateOptions, ExtraConfig, PredictOptions, Resources, StageCallback, StageNode, StageRole};

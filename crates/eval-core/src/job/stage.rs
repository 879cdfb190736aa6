//! Nodos del grafo de job (predict / evaluate) y sus opciones.
use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_PREDICT_REPLICAS, STAGE_EVALUATE, STAGE_PREDICT};
use crate::errors::EvalError;
use crate::model::Metrics;
use crate::pipeline::callbacks::RoleVariant;
use crate::pipeline::{EvaluateRole, PipelineConfig, PredictRole};

/// Recursos solicitados por un stage: nombre -> cantidad.
pub type Resources = IndexMap<String, Value>;

/// Kwargs extra que el host entrega al handler del stage.
pub type ExtraConfig = Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    Predict,
    Evaluate,
}

impl StageRole {
    /// Nombre con el que el stage se registra en el host (y `step` del worker).
    pub fn name(&self) -> &'static str {
        match self {
            StageRole::Predict => STAGE_PREDICT,
            StageRole::Evaluate => STAGE_EVALUATE,
        }
    }

    pub fn from_step(step: &str) -> Option<Self> {
        match step {
            STAGE_PREDICT => Some(StageRole::Predict),
            STAGE_EVALUATE => Some(StageRole::Evaluate),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub enum StageCallback {
    Predict(PredictRole),
    Evaluate(EvaluateRole),
}

/// Stage validado del grafo.
///
/// `needs` referencia `callback_name` de otros stages del mismo grafo.
#[derive(Clone)]
pub struct StageNode {
    pub role: StageRole,
    pub callback_name: String,
    pub callback: StageCallback,
    pub needs: Vec<String>,
    pub resources: Resources,
    pub concurrency: u32,
    pub replicas: u32,
    pub extra_config: ExtraConfig,
}

impl StageNode {
    pub fn pipeline_config(&self) -> Result<PipelineConfig, EvalError> {
        PipelineConfig::from_extra(&self.extra_config)
    }

    /// Descripción serializable (sin callback), base del manifest y del hash.
    pub fn describe(&self) -> Value {
        json!({
            "name": self.role.name(),
            "callback": self.callback_name,
            "variant": self.variant_name(),
            "needs": self.needs,
            "resources": self.resources,
            "concurrency": self.concurrency,
            "replicas": self.replicas,
            "extra_config": self.extra_config,
        })
    }
}

impl RoleVariant for StageNode {
    fn variant_name(&self) -> &'static str {
        match &self.callback {
            StageCallback::Predict(r) => r.variant_name(),
            StageCallback::Evaluate(r) => r.variant_name(),
        }
    }
}

impl std::fmt::Debug for StageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageNode")
         .field("role", &self.role)
         .field("callback_name", &self.callback_name)
         .field("needs", &self.needs)
         .field("resources", &self.resources)
         .field("concurrency", &self.concurrency)
         .field("replicas", &self.replicas)
         .field("extra_config", &self.extra_config)
         .finish()
    }
}

/// Cada recurso debe tener nombre y una cantidad positiva (número finito > 0
/// o cadena no vacía, p.ej. "4Gi").
pub fn validate_resources(resources: &Resources) -> Result<(), EvalError> {
    for (name, amount) in resources {
        if name.trim().is_empty() {
            return Err(EvalError::config("resource name cannot be empty"));
        }
        let ok = match amount {
            Value::Number(n) => n.as_f64().is_some_and(|v| v.is_finite() && v > 0.0),
            Value::String(s) => !s.trim().is_empty(),
            _ => false,
        };
        if !ok {
            return Err(EvalError::config(format!("invalid amount {amount} for resource {name}")));
        }
    }
    Ok(())
}

pub(crate) fn require_positive(field: &str, value: u32) -> Result<(), EvalError> {
    if value == 0 {
        return Err(EvalError::config(format!("{field} must be >= 1")));
    }
    Ok(())
}

/// Opciones del stage predict.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictOptions {
    pub datasets: Vec<String>,
    pub resources: Resources,
    pub needs: Vec<String>,
    pub concurrency: u32,
    pub replicas: u32,
    pub batch_size: usize,
    pub fail_on_error: bool,
    pub auto_log: bool,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self { datasets: Vec::new(),
               resources: Resources::new(),
               needs: Vec::new(),
               concurrency: DEFAULT_CONCURRENCY,
               replicas: DEFAULT_PREDICT_REPLICAS,
               batch_size: DEFAULT_BATCH_SIZE,
               fail_on_error: true,
               auto_log: true }
    }
}

impl PredictOptions {
    pub fn datasets<I, S>(mut self, uris: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.datasets = uris.into_iter().map(Into::into).collect();
        self
    }

    pub fn resource(mut self, name: impl Into<String>, amount: impl Into<Value>) -> Self {
        self.resources.insert(name.into(), amount.into());
        self
    }

    pub fn needs(mut self, names: &[&str]) -> Self {
        self.needs = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn concurrency(mut self, n: u32) -> Self {
        self.concurrency = n;
        self
    }

    pub fn replicas(mut self, n: u32) -> Self {
        self.replicas = n;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn fail_on_error(mut self, v: bool) -> Self {
        self.fail_on_error = v;
        self
    }

    pub fn auto_log(mut self, v: bool) -> Self {
        self.auto_log = v;
        self
    }

    pub(crate) fn extra_config(&self) -> Result<ExtraConfig, EvalError> {
        let cfg = PipelineConfig { predict_batch_size: self.batch_size,
                                   ignore_error: !self.fail_on_error,
                                   predict_auto_log: self.auto_log,
                                   ignore_dataset_data: !self.auto_log,
                                   dataset_uris: self.datasets.clone(),
                                   ..PipelineConfig::default() };
        cfg.validate()?;
        to_extra(&cfg)
    }
}

/// Opciones del stage evaluate. `needs` es obligatorio.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateOptions {
    pub needs: Vec<String>,
    pub resources: Resources,
    pub use_predict_auto_log: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self { needs: Vec::new(),
               resources: Resources::new(),
               use_predict_auto_log: true }
    }
}

impl EvaluateOptions {
    pub fn needs(mut self, names: &[&str]) -> Self {
        self.needs = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn resource(mut self, name: impl Into<String>, amount: impl Into<Value>) -> Self {
        self.resources.insert(name.into(), amount.into());
        self
    }

    pub fn use_predict_auto_log(mut self, v: bool) -> Self {
        self.use_predict_auto_log = v;
        self
    }

    pub(crate) fn extra_config(&self) -> Result<ExtraConfig, EvalError> {
        let cfg = PipelineConfig { predict_auto_log: self.use_predict_auto_log,
                                   ..PipelineConfig::default() };
        to_extra(&cfg)
    }
}

fn to_extra(cfg: &PipelineConfig) -> Result<ExtraConfig, EvalError> {
    match serde_json::to_value(cfg)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(EvalError::Serialization(format!("pipeline config serialized as {other}"))),
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ErrorPolicy;
use crate::constants::DEFAULT_BATCH_SIZE;
use crate::errors::EvalError;
use crate::model::Metrics;

/// Configuración del `PipelineHandler`.
///
/// Su forma serializada es el `extra_config` de un stage del job graph, por
/// eso los nombres de campo son los de ese contrato.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub predict_batch_size: usize,
    pub ignore_dataset_data: bool,
    pub ignore_error: bool,
    pub flush_result: bool,
    pub predict_auto_log: bool,
    pub dataset_uris: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { predict_batch_size: DEFAULT_BATCH_SIZE,
               ignore_dataset_data: false,
               ignore_error: false,
               flush_result: false,
               predict_auto_log: true,
               dataset_uris: Vec::new() }
    }
}

impl PipelineConfig {
    pub fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::from_ignore_error(self.ignore_error)
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if self.predict_batch_size == 0 {
            return Err(EvalError::config("predict_batch_size must be >= 1"));
        }
        Ok(())
    }

    /// Construye la configuración a partir del `extra_config` de un stage;
    /// las claves ausentes toman su valor por defecto.
    pub fn from_extra(extra: &Metrics) -> Result<Self, EvalError> {
        let obj: serde_json::Map<String, Value> = extra.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let cfg: Self = serde_json::from_value(Value::Object(obj))
            .map_err(|e| EvalError::config(format!("invalid stage config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

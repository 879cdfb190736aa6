//! Errores del núcleo de evaluación.
//!
//! Taxonomía:
//! - `Configuration`: registro inválido o invocación mal configurada. Nunca se
//!   reintenta.
//! - `ItemProcessing`: el callback de predict falló sobre un batch. Según la
//!   `ErrorPolicy` aborta el run o queda registrado en la timeline.
//! - `StageFailure`: fallo de la orquestación o del callback de evaluate;
//!   siempre fatal para el run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{RowIndex, RunStatus};

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum EvalError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("item processing failed for rows {indices:?}: {message}")]
    ItemProcessing { indices: Vec<RowIndex>, message: String },
    #[error("stage failure: {0}")]
    StageFailure(String),
    #[error("invalid status transition {from} -> {to}")]
    InvalidStatusTransition { from: RunStatus, to: RunStatus },
    #[error("timeline journal already closed")]
    JournalClosed,
    #[error("dataset error: {0}")]
    Dataset(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EvalError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// `true` para los errores de configuración (registro o primera invocación).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error opaco devuelto por los callbacks del usuario.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Resultado de un callback del usuario (predict/ppl/evaluate/cmp).
pub type CallbackResult<T> = Result<T, CallbackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_variant_format() {
        let err = EvalError::config("needs is required for evaluate function");
        assert_eq!(err.to_string(), "configuration error: needs is required for evaluate function");
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_transition_format() {
        let err = EvalError::InvalidStatusTransition { from: RunStatus::Success,
                                                       to: RunStatus::Running };
        assert_eq!(err.to_string(), "invalid status transition success -> running");
    }

    #[test]
    fn error_roundtrips_through_json() {
        let err = EvalError::ItemProcessing { indices: vec![RowIndex::Int(2), RowIndex::Int(3)],
                                              message: "boom".into() };
        let v = serde_json::to_value(&err).unwrap();
        let back: EvalError = serde_json::from_value(v).unwrap();
        assert_eq!(back, err);
    }
}

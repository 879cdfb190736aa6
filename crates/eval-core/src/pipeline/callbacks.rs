//! Callbacks del usuario y sus roles.
//!
//! `predict`/`ppl` son nombres alternativos del mismo rol, igual que
//! `evaluate`/`cmp`. Cada rol admite una sola variante: asignar una segunda
//! es un error de configuración.
use std::sync::Arc;

use serde_json::Value;

use crate::dataset::DatasetInfo;
use crate::errors::{CallbackResult, EvalError};
use crate::model::{Features, RowIndex};
use crate::store::{EvaluationLogStore, ResultIter};

/// Filas entregadas al callback de predict.
pub enum PredictBatch<'a> {
    /// `batch_size == 1`: una fila.
    Single {
        features: &'a Features,
        index: &'a RowIndex,
        index_with_dataset: &'a str,
    },
    /// `batch_size > 1`: listas paralelas; el callback debe devolver un array
    /// con un resultado por fila, en el mismo orden.
    Batch {
        features: Vec<&'a Features>,
        index: Vec<&'a RowIndex>,
        index_with_dataset: Vec<&'a str>,
    },
}

impl PredictBatch<'_> {
    pub fn len(&self) -> usize {
        match self {
            PredictBatch::Single { .. } => 1,
            PredictBatch::Batch { index, .. } => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PredictInput<'a> {
    pub batch: PredictBatch<'a>,
    pub dataset_info: &'a DatasetInfo,
    pub log_store: &'a EvaluationLogStore,
}

pub trait Predictor: Send + Sync {
    fn predict(&self, input: PredictInput<'_>) -> CallbackResult<Value>;
}

impl<F> Predictor for F where F: Fn(PredictInput<'_>) -> CallbackResult<Value> + Send + Sync
{
    fn predict(&self, input: PredictInput<'_>) -> CallbackResult<Value> {
        self(input)
    }
}

/// Entrada del callback de evaluate.
pub enum EvaluateInput {
    /// Resultados auto-logueados por los workers de predict.
    PredictResults(ResultIter),
    /// Sin auto-log: el callback obtiene sus datos por su cuenta.
    Empty,
}

pub trait Evaluator: Send + Sync {
    fn evaluate(&self, input: EvaluateInput, log_store: &EvaluationLogStore) -> CallbackResult<()>;
}

impl<F> Evaluator for F where F: Fn(EvaluateInput, &EvaluationLogStore) -> CallbackResult<()> + Send + Sync
{
    fn evaluate(&self, input: EvaluateInput, log_store: &EvaluationLogStore) -> CallbackResult<()> {
        self(input, log_store)
    }
}

/// Variante de un rol (para mensajes y manifiestos).
pub trait RoleVariant {
    fn variant_name(&self) -> &'static str;
}

#[derive(Clone)]
pub enum PredictRole {
    Predict(Arc<dyn Predictor>),
    Ppl(Arc<dyn Predictor>),
}

impl PredictRole {
    pub fn predict<F>(f: F) -> Self
        where F: Fn(PredictInput<'_>) -> CallbackResult<Value> + Send + Sync + 'static
    {
        PredictRole::Predict(Arc::new(f))
    }

    pub fn ppl<F>(f: F) -> Self
        where F: Fn(PredictInput<'_>) -> CallbackResult<Value> + Send + Sync + 'static
    {
        PredictRole::Ppl(Arc::new(f))
    }

    pub fn predictor(&self) -> &dyn Predictor {
        match self {
            PredictRole::Predict(p) | PredictRole::Ppl(p) => p.as_ref(),
        }
    }
}

impl RoleVariant for PredictRole {
    fn variant_name(&self) -> &'static str {
        match self {
            PredictRole::Predict(_) => "predict",
            PredictRole::Ppl(_) => "ppl",
        }
    }
}

#[derive(Clone)]
pub enum EvaluateRole {
    Evaluate(Arc<dyn Evaluator>),
    Cmp(Arc<dyn Evaluator>),
}

impl EvaluateRole {
    pub fn evaluate<F>(f: F) -> Self
        where F: Fn(EvaluateInput, &EvaluationLogStore) -> CallbackResult<()> + Send + Sync + 'static
    {
        EvaluateRole::Evaluate(Arc::new(f))
    }

    pub fn cmp<F>(f: F) -> Self
        where F: Fn(EvaluateInput, &EvaluationLogStore) -> CallbackResult<()> + Send + Sync + 'static
    {
        EvaluateRole::Cmp(Arc::new(f))
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        match self {
            EvaluateRole::Evaluate(e) | EvaluateRole::Cmp(e) => e.as_ref(),
        }
    }
}

impl RoleVariant for EvaluateRole {
    fn variant_name(&self) -> &'static str {
        match self {
            EvaluateRole::Evaluate(_) => "evaluate",
            EvaluateRole::Cmp(_) => "cmp",
        }
    }
}

/// Hueco de un rol: se asigna una sola vez.
pub struct RoleSlot<R> {
    role: Option<R>,
}

impl<R> Default for RoleSlot<R> {
    fn default() -> Self {
        Self { role: None }
    }
}

impl<R: RoleVariant> RoleSlot<R> {
    pub fn assign(&mut self, role: R) -> Result<(), EvalError> {
        if let Some(existing) = &self.role {
            return Err(EvalError::config(format!("{} and {} cannot be defined at the same time",
                                                 existing.variant_name(),
                                                 role.variant_name())));
        }
        self.role = Some(role);
        Ok(())
    }

    pub fn get(&self) -> Option<&R> {
        self.role.as_ref()
    }

    pub fn into_inner(self) -> Option<R> {
        self.role
    }
}

//! Job de demostración: clasificador de paridad sobre un dataset sintético.
//!
//! - predict: devuelve `x % 2`, salvo en múltiplos de 7 (se equivoca a
//!   propósito para que la accuracy no sea trivial). Falla en las filas
//!   marcadas como `corrupt`.
//! - evaluate: compara con la etiqueta, escribe una fila por item en la tabla
//!   `labels` y la accuracy en el resumen del run.
use std::sync::Arc;

use eval_core::job::StageRole;
use eval_core::{Artifact, ArtifactKind, CallbackResult, DatasetRow, DatasetUri, EvalError, EvaluateInput,
                EvaluateOptions, EvaluationLogStore, Features, InMemoryDatasetCatalog, JobGraph, JobGraphBuilder,
                Metrics, PredictBatch, PredictInput, PredictOptions, PredictSummary, RunContext, StepOutcome,
                SummaryArgs};
use eval_persistence::LocalBackend;
use log::info;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};

pub const DATASET_NAME: &str = "parity";
pub const DATASET_VERSION: &str = "v1";
pub const PREDICT_CALLBACK: &str = "predict_parity";
pub const EVALUATE_CALLBACK: &str = "evaluate_accuracy";

/// Filas `x = 0..rows`, etiqueta `x % 2` y una miniatura enlazada (con cache)
/// que el predict libera tras procesar la fila.
pub fn seed_dataset(catalog: &InMemoryDatasetCatalog, rows: i64, corrupt: &[i64]) -> DatasetUri {
    let data = (0..rows).map(|x| {
                            let mut features = Features::new().with("x", json!(x))
                                                              .with("label", json!(x % 2))
                                                              .with("thumb",
                                                                    Artifact::linked(ArtifactKind::Image,
                                                                                     format!("mem://{DATASET_NAME}/{x}.png"),
                                                                                     Some(vec![x as u8; 16])));
                            if corrupt.contains(&x) {
                                features.insert("x", Value::Null);
                            }
                            DatasetRow::new(x, features)
                        })
                        .collect();
    let info: Metrics = [("rows".to_string(), json!(rows)), ("task".to_string(), json!("parity"))].into_iter()
                                                                                                 .collect();
    catalog.add(DATASET_NAME, DATASET_VERSION, data, info)
}

fn classify(features: &Features) -> CallbackResult<i64> {
    let x = features.json("x")
                    .and_then(Value::as_i64)
                    .ok_or("feature x is missing or not an integer")?;
    Ok(if x % 7 == 0 { 1 - x % 2 } else { x % 2 })
}

pub fn predict_parity(input: PredictInput<'_>) -> CallbackResult<Value> {
    match input.batch {
        PredictBatch::Single { features, .. } => Ok(json!(classify(features)?)),
        PredictBatch::Batch { features, .. } => {
            let out = features.into_iter().map(classify).collect::<CallbackResult<Vec<_>>>()?;
            Ok(json!(out))
        }
    }
}

pub fn evaluate_accuracy(input: EvaluateInput, log_store: &EvaluationLogStore) -> CallbackResult<()> {
    let EvaluateInput::PredictResults(results) = input else {
        return Err("evaluate_accuracy needs the predict results".into());
    };
    let (mut total, mut hits) = (0u64, 0u64);
    for rec in results {
        let rec = rec?;
        let label = rec.features.json("label").and_then(Value::as_i64);
        let hit = label.is_some() && label == rec.result.as_i64();
        hits += u64::from(hit);
        total += 1;
        let row: Metrics = [("label".to_string(), json!(label)),
                            ("pred".to_string(), rec.result.clone()),
                            ("hit".to_string(), json!(hit))].into_iter()
                                                             .collect();
        log_store.log("labels", rec.data_id.as_str(), row)?;
    }
    let accuracy = if total == 0 { 0.0 } else { hits as f64 / total as f64 };
    log_store.log_summary(SummaryArgs::new().kw("accuracy", accuracy).kw("total", total))?;
    Ok(())
}

/// predict (batch 4, réplicas configurables, tolera errores) -> evaluate.
pub fn job_graph(dataset_uri: &str, replicas: u32) -> Result<JobGraph, EvalError> {
    let mut builder = JobGraphBuilder::new();
    builder.predict_with(PREDICT_CALLBACK,
                         PredictOptions::default().datasets([dataset_uri])
                                                  .batch_size(4)
                                                  .replicas(replicas)
                                                  .fail_on_error(false)
                                                  .resource("cpu", 1),
                         predict_parity)?
           .evaluate(EVALUATE_CALLBACK,
                     EvaluateOptions::default().needs(&[PREDICT_CALLBACK]),
                     evaluate_accuracy)?;
    builder.build()
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub version: String,
    pub graph_hash: String,
    pub predicted_rows: usize,
    pub failed_rows: usize,
    pub summary: Metrics,
}

/// Ejecuta el job completo en local: réplicas de predict en paralelo
/// compartiendo sesión y después el worker de evaluate.
pub fn run_local(backend: &LocalBackend,
                 catalog: Arc<InMemoryDatasetCatalog>,
                 graph: &JobGraph,
                 project: &str,
                 version: &str)
                 -> Result<DemoReport, EvalError> {
    let replicas = graph.stage(StageRole::Predict)
                        .map(|s| s.replicas)
                        .ok_or_else(|| EvalError::config("job graph has no predict stage"))?;

    let summaries = (0..replicas).into_par_iter()
                                 .map(|index| -> Result<PredictSummary, EvalError> {
                                     let ctx = RunContext::new(project, version, StageRole::Predict.name(), index, vec![]);
                                     let builder = backend.handler_builder(ctx)?.datasets(catalog.clone());
                                     let mut handler = graph.bind(builder)?.build()?;
                                     let summary = handler.run_predict()?;
                                     handler.close()?;
                                     Ok(summary)
                                 })
                                 .collect::<Result<Vec<_>, _>>()?;
    let predicted_rows = summaries.iter().map(|s| s.succeeded_rows).sum();
    let failed_rows = summaries.iter().map(|s| s.failed_rows).sum();
    info!("predict finished: {predicted_rows} rows ok, {failed_rows} failed, {replicas} replicas");

    let ctx = RunContext::new(project, version, StageRole::Evaluate.name(), 0, vec![]);
    let builder = backend.handler_builder(ctx)?;
    let mut handler = graph.bind(builder)?.build()?;
    if handler.run_step()? != StepOutcome::Evaluate {
        return Err(EvalError::StageFailure("evaluate worker ran another step".into()));
    }
    let summary = handler.log_store().summary()?.unwrap_or_default();
    handler.close()?;

    Ok(DemoReport { version: version.to_string(),
                    graph_hash: graph.graph_hash().to_string(),
                    predicted_rows,
                    failed_rows,
                    summary })
}

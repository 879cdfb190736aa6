//! `PipelineHandler`: orquesta una fase (predict o evaluate) de un worker.
//!
//! Rol en el flujo:
//! - Un worker instancia un handler ligado a su `RunContext` y ejecuta una
//!   fase hasta el final.
//! - La fase corre envuelta en `record_status`: RUNNING al entrar,
//!   SUCCESS/FAILED al salir. Cualquier error se propaga tras marcar FAILED.
//! - La timeline recibe un evento por fila despachada (predict) o uno por
//!   invocación (evaluate), siempre antes de propagar un error.
//! - Los resultados de predict van al `Evaluation` del run si el auto-log
//!   está activo.
//!
//! Ejemplo de uso (comentario):
//!
//! ```ignore
//! let mut handler = PipelineHandler::builder(ctx)
//!     .status_store(status)
//!     .timeline(timeline)
//!     .data_store(store)
//!     .datasets(catalog)
//!     .predict(|input| Ok(json!(1)))
//!     .build()?;
//! handler.run_predict()?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use serde_json::Value;

use super::callbacks::{EvaluateInput, EvaluateRole, PredictBatch, PredictInput, PredictRole, RoleSlot};
use super::service::{ApiFn, Service, ServiceHost};
use super::{ErrorPolicy, PipelineConfig};
use crate::constants::{DEFAULT_RESULT_BUFFER, STAGE_EVALUATE, STAGE_PREDICT};
use crate::dataset::{DatasetInfo, DatasetOpener, DatasetUri};
use crate::errors::{CallbackResult, EvalError};
use crate::journal::{StatusJournal, StatusStore, TimelineWriter};
use crate::model::{DatasetRow, Features, ResultRecord, RunContext, RunStatus, TimelineEvent};
use crate::store::{DataStore, Evaluation, EvaluationLogStore};

/// Contadores de una fase predict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictSummary {
    pub datasets: usize,
    pub batches: usize,
    pub succeeded_rows: usize,
    pub failed_rows: usize,
}

impl PredictSummary {
    pub fn dispatched_rows(&self) -> usize {
        self.succeeded_rows + self.failed_rows
    }
}

/// Resultado de `run_step`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Predict(PredictSummary),
    Evaluate,
}

pub struct PipelineHandler {
    context: RunContext,
    config: PipelineConfig,
    error_policy: ErrorPolicy,
    dataset_uris: Vec<String>,
    predict: Option<PredictRole>,
    evaluate: Option<EvaluateRole>,
    journal: StatusJournal,
    evaluation_store: Evaluation,
    log_store: Arc<EvaluationLogStore>,
    datasets: Option<Arc<dyn DatasetOpener>>,
    service: Service,
}

impl PipelineHandler {
    pub fn builder(context: RunContext) -> PipelineHandlerBuilder {
        PipelineHandlerBuilder::new(context)
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    pub fn dataset_uris(&self) -> &[String] {
        &self.dataset_uris
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.journal.current()
    }

    pub fn log_store(&self) -> &Arc<EvaluationLogStore> {
        &self.log_store
    }

    pub fn evaluation_store(&self) -> &Evaluation {
        &self.evaluation_store
    }

    /// Ejecuta la fase que corresponde al `step` del contexto.
    pub fn run_step(&mut self) -> Result<StepOutcome, EvalError> {
        match self.context.step() {
            STAGE_PREDICT => self.run_predict().map(StepOutcome::Predict),
            STAGE_EVALUATE => self.run_evaluate().map(|_| StepOutcome::Evaluate),
            other => Err(EvalError::config(format!("unknown step {other}, expected {STAGE_PREDICT} or {STAGE_EVALUATE}"))),
        }
    }

    pub fn run_predict(&mut self) -> Result<PredictSummary, EvalError> {
        self.record_status("predict", |h| h.predict_phase())
    }

    pub fn run_evaluate(&mut self) -> Result<(), EvalError> {
        self.record_status("evaluate", |h| h.evaluate_phase())
    }

    /// Escribe los resultados pendientes y cierra la timeline. La timeline
    /// también se cierra al destruir el handler.
    pub fn close(&mut self) -> Result<(), EvalError> {
        debug!("execute {}-{} exit func...", self.context.step(), self.context.index());
        let written = self.evaluation_store.write_pending();
        let closed = self.journal.close();
        written.and(closed)
    }

    pub fn add_api(&mut self, input: Value, output: Value, func: ApiFn, name: &str) -> Result<(), EvalError> {
        self.service.add_api(input, output, func, name)
    }

    pub fn serve(&mut self, addr: &str, port: u16) -> Result<(), EvalError> {
        self.service.serve(addr, port)
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    fn record_status<T>(&mut self,
                        phase: &str,
                        f: impl FnOnce(&mut Self) -> Result<T, EvalError>)
                        -> Result<T, EvalError> {
        info!("start to run {phase} function@{}-{} ...",
              self.context.step(),
              self.context.index());
        self.journal.update(RunStatus::Running)?;
        match f(self) {
            Ok(v) => {
                self.journal.update(RunStatus::Success)?;
                Ok(v)
            }
            Err(e) => {
                error!("{phase} failed @{}: {e}", self.context);
                if let Err(status_err) = self.journal.update(RunStatus::Failed) {
                    warn!("could not persist failed status: {status_err}");
                }
                Err(e)
            }
        }
    }

    /// Parsea las URIs y comprueba que sus prefijos no colisionen (así
    /// `index_with_dataset` es único en el run).
    fn resolve_dataset_uris(&self) -> Result<Vec<DatasetUri>, EvalError> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        let mut uris = Vec::with_capacity(self.dataset_uris.len());
        for raw in &self.dataset_uris {
            let uri = DatasetUri::parse(raw)?;
            if let Some(prev) = seen.insert(uri.index_prefix(), raw) {
                return Err(EvalError::config(format!("datasets {prev} and {raw} share the index prefix {}",
                                                     uri.index_prefix())));
            }
            uris.push(uri);
        }
        Ok(uris)
    }

    fn predict_phase(&mut self) -> Result<PredictSummary, EvalError> {
        let role = self.predict
                       .clone()
                       .ok_or_else(|| EvalError::config("predict or ppl must be defined, predict function is recommended"))?;
        if self.dataset_uris.is_empty() {
            return Err(EvalError::config("context.dataset_uris is empty"));
        }
        let opener = self.datasets
                         .clone()
                         .ok_or_else(|| EvalError::config("no dataset opener bound to the handler"))?;
        let uris = self.resolve_dataset_uris()?;

        let mut summary = PredictSummary::default();
        for uri in &uris {
            let mut ds = opener.open(uri, true)?;
            ds.make_distributed_consumption(self.context.session_id())?;
            let info = ds.info();
            let prefix = ds.uri().index_prefix();
            let before = summary.dispatched_rows();
            for rows in ds.batch_iter(self.config.predict_batch_size)? {
                let rows = rows?;
                summary.batches += 1;
                self.handle_batch(&role, rows, &prefix, &info, &mut summary)?;
            }
            summary.datasets += 1;
            debug!("dataset {uri}: {} rows dispatched", summary.dispatched_rows() - before);
        }

        if self.config.predict_auto_log {
            if self.config.flush_result {
                self.evaluation_store.flush_result()?;
            } else {
                self.evaluation_store.write_pending()?;
            }
        }

        info!("{}-{} handled {} data items for dataset {:?}",
              self.context.step(),
              self.context.index(),
              summary.dispatched_rows(),
              self.dataset_uris);
        Ok(summary)
    }

    fn handle_batch(&mut self,
                    role: &PredictRole,
                    rows: Vec<DatasetRow>,
                    prefix: &str,
                    info: &DatasetInfo,
                    summary: &mut PredictSummary)
                    -> Result<(), EvalError> {
        let start = Instant::now();
        let ids: Vec<String> = rows.iter().map(|r| r.index.with_dataset(prefix)).collect();

        match self.dispatch(role, &rows, &ids, info) {
            Ok(results) => {
                for ((row, id), result) in rows.into_iter().zip(ids).zip(results) {
                    debug!("[{id}] use {:.3}s, session-id:{} @{}-{}",
                           start.elapsed().as_secs_f64(),
                           self.context.session_id(),
                           self.context.step(),
                           self.context.index());
                    self.journal.record(&TimelineEvent::for_row(row.index.clone(), id.clone(), None))?;
                    if self.config.predict_auto_log {
                        let DatasetRow { index, mut features } = row;
                        features.release_artifact_caches();
                        let features = if self.config.ignore_dataset_data { Features::new() } else { features };
                        self.evaluation_store.log_result(ResultRecord { data_id: id,
                                                                        index,
                                                                        result,
                                                                        features })?;
                    }
                    summary.succeeded_rows += 1;
                }
                Ok(())
            }
            Err(message) => {
                let indices: Vec<_> = rows.iter().map(|r| r.index.clone()).collect();
                error!("[{indices:?}] data handle -> failed: {message}");
                for (row, id) in rows.iter().zip(&ids) {
                    self.journal
                        .record(&TimelineEvent::for_row(row.index.clone(), id.clone(), Some(&message)))?;
                }
                summary.failed_rows += rows.len();
                match self.error_policy {
                    ErrorPolicy::FailFast => {
                        self.journal.update(RunStatus::Failed)?;
                        Err(EvalError::ItemProcessing { indices, message })
                    }
                    ErrorPolicy::ContinueOnItemError => Ok(()),
                }
            }
        }
    }

    /// Invoca el callback sobre un batch y devuelve un resultado por fila, o
    /// el mensaje del fallo.
    fn dispatch(&self,
                role: &PredictRole,
                rows: &[DatasetRow],
                ids: &[String],
                info: &DatasetInfo)
                -> Result<Vec<Value>, String> {
        let predictor = role.predictor();
        if self.config.predict_batch_size > 1 {
            let batch = PredictBatch::Batch { features: rows.iter().map(|r| &r.features).collect(),
                                              index: rows.iter().map(|r| &r.index).collect(),
                                              index_with_dataset: ids.iter().map(String::as_str).collect() };
            let out = guarded(|| predictor.predict(self.predict_input(batch, info))).map_err(|e| e.to_string())?;
            return match out {
                Value::Array(items) if items.len() == rows.len() => Ok(items),
                Value::Array(items) => Err(format!("predict returned {} results for {} rows", items.len(), rows.len())),
                other => Err(format!("batch predict must return an array, got {other}")),
            };
        }

        rows.iter()
            .zip(ids)
            .map(|(row, id)| {
                let batch = PredictBatch::Single { features: &row.features,
                                                   index: &row.index,
                                                   index_with_dataset: id };
                guarded(|| predictor.predict(self.predict_input(batch, info))).map_err(|e| e.to_string())
            })
            .collect()
    }

    fn predict_input<'a>(&'a self, batch: PredictBatch<'a>, info: &'a DatasetInfo) -> PredictInput<'a> {
        PredictInput { batch,
                       dataset_info: info,
                       log_store: &self.log_store }
    }

    fn evaluate_phase(&mut self) -> Result<(), EvalError> {
        let now = crate::model::timeline::now_str();
        match self.invoke_evaluate() {
            Ok(()) => self.journal.record(&TimelineEvent::summary(now, None)),
            Err(e) => {
                error!("evaluate exception: {e}");
                let message = match &e {
                    EvalError::StageFailure(m) => m.clone(),
                    other => other.to_string(),
                };
                self.journal.record(&TimelineEvent::summary(now, Some(&message)))?;
                Err(e)
            }
        }
    }

    fn invoke_evaluate(&self) -> Result<(), EvalError> {
        let role = self.evaluate
                       .as_ref()
                       .ok_or_else(|| EvalError::config("evaluate or cmp must be defined, evaluate function is recommended"))?;
        let input = if self.config.predict_auto_log {
            EvaluateInput::PredictResults(self.evaluation_store.get_results()?)
        } else {
            EvaluateInput::Empty
        };
        let evaluator = role.evaluator();
        guarded(|| evaluator.evaluate(input, &self.log_store)).map_err(|e| EvalError::StageFailure(e.to_string()))
    }
}

/// Invoca un callback de usuario. Un panic se convierte en el error del
/// callback para que pase por la misma política que un `Err`.
fn guarded<T>(f: impl FnOnce() -> CallbackResult<T>) -> CallbackResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(format!("panic in user callback: {}",
                                                                          panic_message(payload.as_ref()))
                                                                   .into()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl std::fmt::Display for PipelineHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PipelineHandler status@{}", self.context)
    }
}

/// Builder del handler. Los errores de configuración (roles duplicados,
/// piezas ausentes) se devuelven en `build()`.
pub struct PipelineHandlerBuilder {
    context: RunContext,
    config: PipelineConfig,
    predict: RoleSlot<PredictRole>,
    evaluate: RoleSlot<EvaluateRole>,
    conflict: Option<EvalError>,
    status_store: Option<Box<dyn StatusStore>>,
    timeline: Option<Box<dyn TimelineWriter>>,
    data_store: Option<Arc<dyn DataStore>>,
    log_store: Option<Arc<EvaluationLogStore>>,
    datasets: Option<Arc<dyn DatasetOpener>>,
    result_buffer: usize,
    service_host: Option<Box<dyn ServiceHost>>,
}

impl PipelineHandlerBuilder {
    pub fn new(context: RunContext) -> Self {
        Self { context,
               config: PipelineConfig::default(),
               predict: RoleSlot::default(),
               evaluate: RoleSlot::default(),
               conflict: None,
               status_store: None,
               timeline: None,
               data_store: None,
               log_store: None,
               datasets: None,
               result_buffer: DEFAULT_RESULT_BUFFER,
               service_host: None }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn status_store(mut self, store: impl StatusStore + 'static) -> Self {
        self.status_store = Some(Box::new(store));
        self
    }

    pub fn timeline(mut self, writer: impl TimelineWriter + 'static) -> Self {
        self.timeline = Some(Box::new(writer));
        self
    }

    pub fn data_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.data_store = Some(store);
        self
    }

    /// Instancia compartida del run (p.ej. de un `LogStoreRegistry`). Si no se
    /// indica, se crea una sobre el `data_store`.
    pub fn log_store(mut self, log_store: Arc<EvaluationLogStore>) -> Self {
        self.log_store = Some(log_store);
        self
    }

    pub fn datasets(mut self, opener: Arc<dyn DatasetOpener>) -> Self {
        self.datasets = Some(opener);
        self
    }

    pub fn result_buffer(mut self, capacity: usize) -> Self {
        self.result_buffer = capacity;
        self
    }

    pub fn service_host(mut self, host: Box<dyn ServiceHost>) -> Self {
        self.service_host = Some(host);
        self
    }

    pub fn predict_role(mut self, role: PredictRole) -> Self {
        if let Err(e) = self.predict.assign(role) {
            self.conflict.get_or_insert(e);
        }
        self
    }

    pub fn evaluate_role(mut self, role: EvaluateRole) -> Self {
        if let Err(e) = self.evaluate.assign(role) {
            self.conflict.get_or_insert(e);
        }
        self
    }

    pub fn predict<F>(self, f: F) -> Self
        where F: Fn(PredictInput<'_>) -> CallbackResult<Value> + Send + Sync + 'static
    {
        self.predict_role(PredictRole::predict(f))
    }

    pub fn ppl<F>(self, f: F) -> Self
        where F: Fn(PredictInput<'_>) -> CallbackResult<Value> + Send + Sync + 'static
    {
        self.predict_role(PredictRole::ppl(f))
    }

    pub fn evaluate<F>(self, f: F) -> Self
        where F: Fn(EvaluateInput, &EvaluationLogStore) -> CallbackResult<()> + Send + Sync + 'static
    {
        self.evaluate_role(EvaluateRole::evaluate(f))
    }

    pub fn cmp<F>(self, f: F) -> Self
        where F: Fn(EvaluateInput, &EvaluationLogStore) -> CallbackResult<()> + Send + Sync + 'static
    {
        self.evaluate_role(EvaluateRole::cmp(f))
    }

    /// Construye el handler y persiste el estado START.
    pub fn build(self) -> Result<PipelineHandler, EvalError> {
        if let Some(conflict) = self.conflict {
            return Err(conflict);
        }
        self.config.validate()?;
        let status_store = self.status_store
                               .ok_or_else(|| EvalError::config("status store is required"))?;
        let timeline = self.timeline.ok_or_else(|| EvalError::config("timeline writer is required"))?;
        let data_store = self.data_store.ok_or_else(|| EvalError::config("data store is required"))?;

        let identity = self.context.identity();
        let log_store = match self.log_store {
            Some(ls) if *ls.identity() != identity => {
                return Err(EvalError::config(format!("log store {ls} does not belong to run {}", self.context)));
            }
            Some(ls) => ls,
            None => Arc::new(EvaluationLogStore::new(identity.clone(), data_store.clone())),
        };
        let evaluation_store = Evaluation::new(identity, data_store).with_buffer_capacity(self.result_buffer);

        let dataset_uris = if self.context.dataset_refs().is_empty() {
            self.config.dataset_uris.clone()
        } else {
            self.context.dataset_refs().to_vec()
        };
        let service = match self.service_host {
            Some(host) => Service::with_host(host),
            None => Service::new(),
        };

        let mut journal = StatusJournal::new(status_store, timeline);
        journal.update(RunStatus::Start)?;

        Ok(PipelineHandler { error_policy: self.config.error_policy(),
                             context: self.context,
                             config: self.config,
                             dataset_uris,
                             predict: self.predict.into_inner(),
                             evaluate: self.evaluate.into_inner(),
                             journal,
                             evaluation_store,
                             log_store,
                             datasets: self.datasets,
                             service })
    }
}

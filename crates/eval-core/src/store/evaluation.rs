//! `Evaluation`: el ResultSink de un run.
//!
//! Las tablas de un run viven bajo `project/{project}/eval/{version}/`; el
//! resumen es una tabla por proyecto con una fila por run (id = versión).
//! Los `ResultRecord` se acumulan en un buffer que se vuelca al almacén al
//! llenarse y en `write_pending()`/`flush_result()`. Destruir la instancia
//! con resultados pendientes los intenta escribir y sólo avisa si falla.
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use serde_json::Value;

use super::{DataStore, RecordIter};
use crate::constants::{DEFAULT_RESULT_BUFFER, RESULTS_TABLE, SUMMARY_TABLE};
use crate::errors::EvalError;
use crate::model::{Metrics, ResultRecord, RowIndex, RunIdentity};

/// Secuencia perezosa de resultados deserializados.
pub type ResultIter = Box<dyn Iterator<Item = Result<ResultRecord, EvalError>> + Send>;

pub struct Evaluation {
    identity: RunIdentity,
    store: Arc<dyn DataStore>,
    buffer: Mutex<Vec<ResultRecord>>,
    buffer_capacity: usize,
}

impl Evaluation {
    pub fn new(identity: RunIdentity, store: Arc<dyn DataStore>) -> Self {
        Self { identity,
               store,
               buffer: Mutex::new(Vec::new()),
               buffer_capacity: DEFAULT_RESULT_BUFFER }
    }

    /// Capacidad del buffer de resultados (mínimo 1).
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    pub fn table_name(&self, category: &str) -> String {
        format!("project/{}/eval/{}/{}", self.identity.project, self.identity.version, category)
    }

    pub fn summary_table_name(&self) -> String {
        format!("project/{}/eval/{}", self.identity.project, SUMMARY_TABLE)
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<ResultRecord>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Escribe una fila en la tabla `category` del run.
    pub fn log(&self, category: &str, id: &RowIndex, metrics: Metrics) -> Result<(), EvalError> {
        self.store.put(&self.table_name(category), id, metrics)
    }

    /// Mezcla `metrics` en la fila de resumen del run.
    pub fn log_metrics(&self, metrics: Metrics) -> Result<(), EvalError> {
        let id = RowIndex::Str(self.identity.version.clone());
        self.store.put(&self.summary_table_name(), &id, metrics)
    }

    /// Fila de resumen del run, si existe.
    pub fn summary(&self) -> Result<Option<Metrics>, EvalError> {
        let id = RowIndex::Str(self.identity.version.clone());
        for rec in self.store.scan(&self.summary_table_name())? {
            let rec = rec?;
            if rec.id == id {
                return Ok(Some(rec.fields));
            }
        }
        Ok(None)
    }

    pub fn get(&self, category: &str) -> Result<RecordIter, EvalError> {
        self.store.scan(&self.table_name(category))
    }

    /// Encola un resultado; vuelca el buffer si alcanza su capacidad.
    pub fn log_result(&self, record: ResultRecord) -> Result<(), EvalError> {
        let pending = {
            let mut buf = self.buffer();
            buf.push(record);
            if buf.len() < self.buffer_capacity {
                return Ok(());
            }
            std::mem::take(&mut *buf)
        };
        self.write_results(pending)
    }

    /// Escribe en el almacén los resultados que siguen en el buffer.
    pub fn write_pending(&self) -> Result<(), EvalError> {
        let pending = std::mem::take(&mut *self.buffer());
        self.write_results(pending)
    }

    /// Escribe los pendientes y pide al almacén que los haga durables.
    pub fn flush_result(&self) -> Result<(), EvalError> {
        self.write_pending()?;
        self.store.flush()
    }

    pub fn pending_results(&self) -> usize {
        self.buffer().len()
    }

    fn write_results(&self, records: Vec<ResultRecord>) -> Result<(), EvalError> {
        if records.is_empty() {
            return Ok(());
        }
        debug!("writing {} result records into {}", records.len(), self.table_name(RESULTS_TABLE));
        let table = self.table_name(RESULTS_TABLE);
        for rec in records {
            let id = RowIndex::Str(rec.data_id.clone());
            let mut fields = Metrics::new();
            fields.insert("index".into(), serde_json::to_value(&rec.index)?);
            fields.insert("result".into(), rec.result);
            fields.insert("features".into(), serde_json::to_value(&rec.features)?);
            self.store.put(&table, &id, fields)?;
        }
        Ok(())
    }

    /// Resultados escritos por cualquier worker del run, deserializados.
    pub fn get_results(&self) -> Result<ResultIter, EvalError> {
        let rows = self.store.scan(&self.table_name(RESULTS_TABLE))?;
        Ok(Box::new(rows.map(|row| -> Result<ResultRecord, EvalError> {
                            let row = row?;
                            let mut obj = serde_json::Map::new();
                            obj.insert("data_id".into(), Value::String(row.id.to_string()));
                            obj.extend(row.fields);
                            Ok(serde_json::from_value::<ResultRecord>(Value::Object(obj))?)
                        })))
    }
}

impl Drop for Evaluation {
    fn drop(&mut self) {
        let pending = std::mem::take(&mut *self.buffer());
        if pending.is_empty() {
            return;
        }
        if let Err(e) = self.write_results(pending) {
            warn!("dropping evaluation {:?} with unwritten results: {e}", self.identity);
        }
    }
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Evaluation: id({}), project({})", self.identity.version, self.identity.project)
    }
}

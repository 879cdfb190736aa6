//! ResultSink y EvaluationLogStore sobre un almacén estructurado externo.
//!
//! - `DataStore`: contrato del cliente del almacén (tablas clave -> campos).
//! - `Evaluation`: vista de un run sobre el almacén; bufferiza resultados.
//! - `EvaluationLogStore`: API `log` / `log_summary` / `iter` para los
//!   callbacks del usuario, una instancia por identidad de run.

mod evaluation;
mod log_store;
mod memory;

pub use evaluation::{Evaluation, ResultIter};
pub use log_store::{EvaluationLogStore, LogStoreRegistry, SummaryArgs};
pub use memory::InMemoryDataStore;

use serde::{Deserialize, Serialize};

use crate::errors::EvalError;
use crate::model::{Metrics, RowIndex};

/// Fila de una tabla del almacén.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RowIndex,
    pub fields: Metrics,
}

/// Secuencia perezosa de filas; volver a llamar a `scan` la reinicia.
pub type RecordIter = Box<dyn Iterator<Item = Result<StoredRecord, EvalError>> + Send>;

/// Cliente del almacén estructurado.
///
/// Las escrituras no se sincronizan en el núcleo: la implementación debe ser
/// segura ante llamadas concurrentes.
pub trait DataStore: Send + Sync {
    /// Inserta la fila `id` o mezcla sus campos con los ya existentes.
    fn put(&self, table: &str, id: &RowIndex, fields: Metrics) -> Result<(), EvalError>;

    /// Filas de `table` en orden de primera inserción. Tabla inexistente = vacía.
    fn scan(&self, table: &str) -> Result<RecordIter, EvalError>;

    /// Hace durables las escrituras pendientes, si el backend las acumula.
    fn flush(&self) -> Result<(), EvalError> {
        Ok(())
    }
}

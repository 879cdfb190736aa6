//! Acceso distribuido a datasets.
//!
//! Contrato consumido por el `PipelineHandler`:
//! - `DatasetOpener::open(uri, readonly)` abre un dataset.
//! - `Dataset::make_distributed_consumption(session_id)` reparte las filas
//!   entre todos los workers con el mismo session id: cada uno recibe un
//!   subconjunto disjunto y entre todos lo cubren sin huecos.
//! - `Dataset::batch_iter(batch_size)` produce batches de forma perezosa;
//!   la secuencia es finita y no reiniciable.

mod memory;
mod uri;

pub use memory::{InMemoryDatasetCatalog, SessionCoordinator};
pub use uri::DatasetUri;

use crate::errors::EvalError;
use crate::model::{DatasetRow, Metrics};

/// Metadatos del dataset entregados al callback de predict.
pub type DatasetInfo = Metrics;

pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<Vec<DatasetRow>, EvalError>> + 'a>;

pub trait Dataset {
    /// URI con la versión ya resuelta.
    fn uri(&self) -> &DatasetUri;

    fn info(&self) -> DatasetInfo;

    fn make_distributed_consumption(&mut self, session_id: &str) -> Result<(), EvalError>;

    fn batch_iter(&mut self, batch_size: usize) -> Result<BatchIter<'_>, EvalError>;
}

pub trait DatasetOpener: Send + Sync {
    fn open(&self, uri: &DatasetUri, readonly: bool) -> Result<Box<dyn Dataset>, EvalError>;
}

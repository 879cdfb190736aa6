//! Catálogo de datasets en memoria con coordinador de sesiones.
//!
//! El coordinador reparte rangos de filas (leases) por (session id, dataset):
//! cada petición avanza un cursor compartido, así que los workers de una
//! misma sesión nunca reciben la misma fila y, entre todos, las reciben todas.
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use log::debug;

use super::{BatchIter, Dataset, DatasetInfo, DatasetOpener, DatasetUri};
use crate::constants::DEFAULT_LEASE_SIZE;
use crate::errors::EvalError;
use crate::model::DatasetRow;

pub struct SessionCoordinator {
    cursors: DashMap<(String, String), usize>,
    lease_size: usize,
}

impl SessionCoordinator {
    pub fn new(lease_size: usize) -> Self {
        Self { cursors: DashMap::new(),
               lease_size: lease_size.max(1) }
    }

    /// Siguiente rango sin consumir de `dataset_key` para la sesión, o `None`
    /// si ya se repartieron todas las filas.
    pub fn next_lease(&self, session_id: &str, dataset_key: &str, total: usize) -> Option<Range<usize>> {
        let mut cursor = self.cursors
                             .entry((session_id.to_string(), dataset_key.to_string()))
                             .or_insert(0);
        if *cursor >= total {
            return None;
        }
        let start = *cursor;
        let end = (start + self.lease_size).min(total);
        *cursor = end;
        Some(start..end)
    }
}

impl Default for SessionCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE_SIZE)
    }
}

struct StoredDataset {
    rows: Vec<DatasetRow>,
    info: DatasetInfo,
}

/// Datasets por nombre y versión (la última añadida responde a `latest`).
#[derive(Default)]
pub struct InMemoryDatasetCatalog {
    datasets: DashMap<String, IndexMap<String, Arc<StoredDataset>>>,
    coordinator: Arc<SessionCoordinator>,
}

impl InMemoryDatasetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coordinator(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { datasets: DashMap::new(),
               coordinator }
    }

    pub fn add(&self, name: &str, version: &str, rows: Vec<DatasetRow>, info: DatasetInfo) -> DatasetUri {
        self.datasets
            .entry(name.to_string())
            .or_default()
            .insert(version.to_string(), Arc::new(StoredDataset { rows, info }));
        DatasetUri::new(name, version)
    }

    fn resolve(&self, uri: &DatasetUri) -> Result<(DatasetUri, Arc<StoredDataset>), EvalError> {
        let versions = self.datasets
                           .get(&uri.name)
                           .ok_or_else(|| EvalError::Dataset(format!("dataset {} not found", uri.name)))?;
        let found = if uri.is_latest() {
            versions.last().map(|(v, d)| (uri.with_version(v.clone()), d.clone()))
        } else {
            versions.get(&uri.version).map(|d| (uri.clone(), d.clone()))
        };
        found.ok_or_else(|| EvalError::Dataset(format!("dataset {uri} not found")))
    }
}

impl DatasetOpener for InMemoryDatasetCatalog {
    fn open(&self, uri: &DatasetUri, readonly: bool) -> Result<Box<dyn Dataset>, EvalError> {
        let (resolved, data) = self.resolve(uri)?;
        debug!("open dataset {resolved} readonly={readonly} rows={}", data.rows.len());
        Ok(Box::new(InMemoryDataset { uri: resolved,
                                      data,
                                      coordinator: self.coordinator.clone(),
                                      session: None }))
    }
}

struct InMemoryDataset {
    uri: DatasetUri,
    data: Arc<StoredDataset>,
    coordinator: Arc<SessionCoordinator>,
    session: Option<String>,
}

impl Dataset for InMemoryDataset {
    fn uri(&self) -> &DatasetUri {
        &self.uri
    }

    fn info(&self) -> DatasetInfo {
        self.data.info.clone()
    }

    fn make_distributed_consumption(&mut self, session_id: &str) -> Result<(), EvalError> {
        if session_id.is_empty() {
            return Err(EvalError::Dataset("session id must not be empty".into()));
        }
        self.session = Some(session_id.to_string());
        Ok(())
    }

    fn batch_iter(&mut self, batch_size: usize) -> Result<BatchIter<'_>, EvalError> {
        if batch_size == 0 {
            return Err(EvalError::config("batch size must be >= 1"));
        }
        let source = match &self.session {
            Some(session) => RowSource::Session { coordinator: self.coordinator.clone(),
                                                  session: session.clone(),
                                                  key: format!("{}/{}", self.uri.name, self.uri.version) },
            None => RowSource::Scan { next: 0 },
        };
        Ok(Box::new(InMemoryBatchIter { data: self.data.clone(),
                                        source,
                                        pending: VecDeque::new(),
                                        batch_size }))
    }
}

enum RowSource {
    Scan { next: usize },
    Session {
        coordinator: Arc<SessionCoordinator>,
        session: String,
        key: String,
    },
}

struct InMemoryBatchIter {
    data: Arc<StoredDataset>,
    source: RowSource,
    pending: VecDeque<usize>,
    batch_size: usize,
}

impl InMemoryBatchIter {
    fn next_row(&mut self) -> Option<usize> {
        if let Some(i) = self.pending.pop_front() {
            return Some(i);
        }
        let total = self.data.rows.len();
        match &mut self.source {
            RowSource::Scan { next } => {
                if *next >= total {
                    return None;
                }
                *next += 1;
                Some(*next - 1)
            }
            RowSource::Session { coordinator,
                                 session,
                                 key, } => {
                let lease = coordinator.next_lease(session, key, total)?;
                self.pending.extend(lease);
                self.pending.pop_front()
            }
        }
    }
}

impl Iterator for InMemoryBatchIter {
    type Item = Result<Vec<DatasetRow>, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.next_row() {
                Some(i) => batch.push(self.data.rows[i].clone()),
                None => break,
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

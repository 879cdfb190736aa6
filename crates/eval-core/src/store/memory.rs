use dashmap::DashMap;
use indexmap::IndexMap;

use super::{DataStore, RecordIter, StoredRecord};
use crate::errors::EvalError;
use crate::model::{Metrics, RowIndex};

/// Almacén en memoria compartible entre hilos (un "servidor" para tests y demos).
#[derive(Default)]
pub struct InMemoryDataStore {
    tables: DashMap<String, IndexMap<RowIndex, Metrics>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }
}

impl DataStore for InMemoryDataStore {
    fn put(&self, table: &str, id: &RowIndex, fields: Metrics) -> Result<(), EvalError> {
        let mut t = self.tables.entry(table.to_string()).or_default();
        let row = t.entry(id.clone()).or_default();
        row.extend(fields);
        Ok(())
    }

    fn scan(&self, table: &str) -> Result<RecordIter, EvalError> {
        let snapshot: Vec<StoredRecord> = self.tables
                                              .get(table)
                                              .map(|t| {
                                                  t.iter()
                                                   .map(|(id, fields)| StoredRecord { id: id.clone(),
                                                                                      fields: fields.clone() })
                                                   .collect()
                                              })
                                              .unwrap_or_default();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }
}

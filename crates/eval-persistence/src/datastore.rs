//! `LocalDataStore`: tablas del almacén estructurado como ficheros JSON lines.
//!
//! Cada `put` añade una línea `{"id": .., "fields": {..}}` a la tabla; `scan`
//! relee el fichero y mezcla las líneas con el mismo id, manteniendo el orden
//! de primera inserción. Varios workers del mismo proceso comparten la
//! instancia; el lock serializa las escrituras.
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use eval_core::model::{Metrics, RowIndex};
use eval_core::store::{DataStore, RecordIter, StoredRecord};
use eval_core::EvalError;
use indexmap::IndexMap;
use log::debug;

use crate::error::PersistenceError;
use crate::layout::safe_segment;

pub struct LocalDataStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalDataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(),
               write_lock: Mutex::new(()) }
    }

    /// `project/self/eval/v1/results` -> `<dir>/project/self/eval/v1/results.jsonl`
    pub fn table_path(&self, table: &str) -> Result<PathBuf, PersistenceError> {
        let (parents, name) = table.rsplit_once('/').unwrap_or(("", table));
        let mut path = self.dir.clone();
        if !parents.is_empty() {
            for seg in parents.split('/') {
                path.push(safe_segment(seg)?);
            }
        }
        path.push(format!("{}.jsonl", safe_segment(name)?));
        Ok(path)
    }

    fn append(&self, table: &str, record: &StoredRecord) -> Result<(), PersistenceError> {
        let path = self.table_path(table)?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;
        Ok(())
    }

    fn load(&self, table: &str) -> Result<Vec<StoredRecord>, PersistenceError> {
        let path = self.table_path(table)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut rows: IndexMap<RowIndex, Metrics> = IndexMap::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let rec: StoredRecord = serde_json::from_str(&line)?;
            rows.entry(rec.id).or_default().extend(rec.fields);
        }
        debug!("scan {table}: {} rows", rows.len());
        Ok(rows.into_iter()
               .map(|(id, fields)| StoredRecord { id, fields })
               .collect())
    }
}

impl DataStore for LocalDataStore {
    fn put(&self, table: &str, id: &RowIndex, fields: Metrics) -> Result<(), EvalError> {
        let record = StoredRecord { id: id.clone(), fields };
        Ok(self.append(table, &record)?)
    }

    fn scan(&self, table: &str) -> Result<RecordIter, EvalError> {
        let rows = self.load(table)?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

//! Filas de dataset y registros de resultado.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Features;
use crate::constants::INDEX_JOIN_STR;

/// Id original de una fila: entero o string según el dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowIndex {
    Int(i64),
    Str(String),
}

impl std::fmt::Display for RowIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowIndex::Int(i) => write!(f, "{i}"),
            RowIndex::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RowIndex {
    fn from(v: i64) -> Self {
        RowIndex::Int(v)
    }
}

impl From<&str> for RowIndex {
    fn from(v: &str) -> Self {
        RowIndex::Str(v.to_string())
    }
}

impl RowIndex {
    /// Id compuesto `{prefix}{INDEX_JOIN_STR}{index}`, único en el run.
    pub fn with_dataset(&self, prefix: &str) -> String {
        format!("{prefix}{INDEX_JOIN_STR}{self}")
    }
}

/// Fila entregada por el lector particionado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub index: RowIndex,
    pub features: Features,
}

impl DatasetRow {
    pub fn new(index: impl Into<RowIndex>, features: Features) -> Self {
        Self { index: index.into(),
               features }
    }
}

/// Resultado de una fila, escrito una única vez al `ResultSink`.
///
/// `data_id` se deriva de (tipo, nombre, versión del dataset, índice de fila),
/// por lo que reprocesar la misma fila produce el mismo id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub data_id: String,
    pub index: RowIndex,
    pub result: Value,
    #[serde(default)]
    pub features: Features,
}

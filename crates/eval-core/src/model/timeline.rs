//! Eventos de la timeline (journal append-only por item).
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::RowIndex;

/// Un evento por fila procesada en predict, o uno por invocación de evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(rename = "time")]
    pub timestamp: String,
    pub status: bool,
    pub exception: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<RowIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_with_dataset: Option<String>,
}

impl TimelineEvent {
    /// Evento de una fila del predict. `exception` vacío si la fila fue bien.
    pub fn for_row(index: RowIndex, index_with_dataset: String, exception: Option<&str>) -> Self {
        Self { timestamp: now_str(),
               status: exception.is_none(),
               exception: exception.unwrap_or_default().to_string(),
               index: Some(index),
               index_with_dataset: Some(index_with_dataset) }
    }

    /// Evento resumen de una invocación de evaluate.
    pub fn summary(timestamp: String, exception: Option<&str>) -> Self {
        Self { timestamp,
               status: exception.is_none(),
               exception: exception.unwrap_or_default().to_string(),
               index: None,
               index_with_dataset: None }
    }
}

/// Timestamp UTC con microsegundos.
pub fn now_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

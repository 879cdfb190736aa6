//! StatusJournal: estado grueso del run + timeline append-only.
//!
//! Dos rutas de escritura independientes bajo la misma raíz
//! (project, version, step, index):
//! - `StatusStore`: fichero de estado actual, sobrescrito en cada transición.
//! - `TimelineWriter`: journal append-only, una escritura física por evento.
//!
//! Este núcleo nunca relee la timeline: existe como rastro de auditoría.

mod memory;
mod status;
mod timeline;

pub use memory::{InMemoryStatusStore, InMemoryTimeline};
pub use status::StatusStore;
pub use timeline::TimelineWriter;

use log::{debug, warn};

use crate::errors::EvalError;
use crate::model::{RunStatus, TimelineEvent};

/// Compone `StatusStore` + `TimelineWriter` y aplica la máquina de estados.
///
/// Invariantes:
/// - Las transiciones de estado son monótonas (`RunStatus::can_transition_to`).
/// - Escribir de nuevo el mismo estado terminal es un no-op.
/// - Una vez alcanzado un estado terminal no se aceptan más eventos.
/// - La timeline se cierra en `close()` o, en su defecto, en `Drop`.
pub struct StatusJournal {
    status_store: Box<dyn StatusStore>,
    timeline: Box<dyn TimelineWriter>,
    current: Option<RunStatus>,
    closed: bool,
}

impl StatusJournal {
    pub fn new(status_store: Box<dyn StatusStore>, timeline: Box<dyn TimelineWriter>) -> Self {
        Self { status_store,
               timeline,
               current: None,
               closed: false }
    }

    pub fn current(&self) -> Option<RunStatus> {
        self.current
    }

    /// Persiste una transición de estado (sobrescribe el estado actual).
    pub fn update(&mut self, status: RunStatus) -> Result<(), EvalError> {
        match self.current {
            None => {}
            Some(cur) if cur == status && cur.is_terminal() => return Ok(()),
            Some(cur) if !cur.can_transition_to(status) => {
                return Err(EvalError::InvalidStatusTransition { from: cur, to: status });
            }
            Some(_) => {}
        }
        self.status_store.write_status(status)?;
        debug!("status -> {status}");
        self.current = Some(status);
        Ok(())
    }

    /// Añade un evento a la timeline.
    pub fn record(&mut self, event: &TimelineEvent) -> Result<(), EvalError> {
        if self.closed || self.current.is_some_and(|s| s.is_terminal()) {
            return Err(EvalError::JournalClosed);
        }
        self.timeline.append(event)
    }

    /// Cierra la timeline. Idempotente.
    pub fn close(&mut self) -> Result<(), EvalError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.timeline.close()
    }
}

impl Drop for StatusJournal {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("timeline close failed: {e}");
        }
    }
}

use crate::errors::EvalError;
use crate::model::TimelineEvent;

/// Journal append-only de eventos por item.
pub trait TimelineWriter: Send {
    /// Añade un evento; una escritura física por evento.
    fn append(&mut self, event: &TimelineEvent) -> Result<(), EvalError>;
    /// Vacía y libera el recurso subyacente.
    fn close(&mut self) -> Result<(), EvalError>;
}

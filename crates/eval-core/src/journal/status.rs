use crate::errors::EvalError;
use crate::model::RunStatus;

/// Persistencia del estado actual del worker. Cada escritura sobrescribe la
/// anterior: los lectores externos siempre ven el último estado.
pub trait StatusStore: Send {
    fn write_status(&mut self, status: RunStatus) -> Result<(), EvalError>;
}

use serde::{Deserialize, Serialize};

/// Qué hacer cuando el callback de predict falla sobre un batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// El run pasa a FAILED y el error se propaga; no se despachan más batches.
    FailFast,
    /// El batch queda registrado como fallido en la timeline y se continúa.
    ContinueOnItemError,
}

impl ErrorPolicy {
    pub fn from_ignore_error(ignore_error: bool) -> Self {
        if ignore_error {
            ErrorPolicy::ContinueOnItemError
        } else {
            ErrorPolicy::FailFast
        }
    }
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::FailFast
    }
}

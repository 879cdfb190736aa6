//! Carga de configuración desde variables de entorno (y `.env`).
//!
//! - `StoreConfig`: raíz del backend local y capacidad del buffer de resultados.
//! - `context_from_env`: identidad del worker inyectada por el scheduler.

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;
use eval_core::constants::DEFAULT_RESULT_BUFFER;
use eval_core::RunContext;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

pub const DEFAULT_ROOT: &str = ".evalflow";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub result_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { root: PathBuf::from(DEFAULT_ROOT),
               result_buffer: DEFAULT_RESULT_BUFFER }
    }
}

impl StoreConfig {
    /// `EVALFLOW_ROOT` y `EVALFLOW_RESULT_BUFFER`; valores ausentes o no
    /// parseables toman el valor por defecto.
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let root = env::var("EVALFLOW_ROOT").map(PathBuf::from)
                                            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ROOT));
        let result_buffer = env::var("EVALFLOW_RESULT_BUFFER").ok()
                                                              .and_then(|v| v.parse().ok())
                                                              .filter(|n: &usize| *n > 0)
                                                              .unwrap_or(DEFAULT_RESULT_BUFFER);
        Self { root, result_buffer }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(),
               ..Self::default() }
    }
}

/// `RunContext` del worker a partir de `SW_*`.
pub fn context_from_env() -> Result<RunContext, PersistenceError> {
    Lazy::force(&DOTENV_LOADED);
    context_from_vars(|key| env::var(key).ok())
}

/// Igual que `context_from_env` pero con un lookup arbitrario.
pub fn context_from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<RunContext, PersistenceError> {
    let required = |key: &str| {
        lookup(key).filter(|v| !v.trim().is_empty())
                   .ok_or_else(|| PersistenceError::Config(format!("{key} is not defined")))
    };
    let project = lookup("SW_PROJECT").filter(|v| !v.trim().is_empty())
                                      .unwrap_or_else(|| "self".to_string());
    let version = required("SW_RUN_VERSION")?;
    let step = required("SW_STEP")?;
    let index = match lookup("SW_TASK_INDEX") {
        Some(raw) => raw.trim()
                        .parse::<u32>()
                        .map_err(|e| PersistenceError::Config(format!("SW_TASK_INDEX={raw}: {e}")))?,
        None => 0,
    };
    let dataset_refs = lookup("SW_DATASET_URI").map(|raw| {
                                                   raw.split(|c: char| c == ',' || c.is_whitespace())
                                                      .filter(|s| !s.is_empty())
                                                      .map(str::to_string)
                                                      .collect()
                                               })
                                               .unwrap_or_default();
    Ok(RunContext::new(project, version, step, index, dataset_refs))
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn builds_context_from_vars() {
        let env = vars(&[("SW_PROJECT", "mnist"),
                         ("SW_RUN_VERSION", "abcd1234"),
                         ("SW_STEP", "predict"),
                         ("SW_TASK_INDEX", "2"),
                         ("SW_DATASET_URI", "mnist/v1, fashion/v2")]);
        let ctx = context_from_vars(|k| env.get(k).cloned()).unwrap();
        assert_eq!(ctx.to_string(), "mnist/abcd1234@predict-2");
        assert_eq!(ctx.dataset_refs(), &["mnist/v1".to_string(), "fashion/v2".to_string()]);
    }

    #[test]
    fn missing_version_or_bad_index_is_config_error() {
        let env = vars(&[("SW_STEP", "predict")]);
        let err = context_from_vars(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, PersistenceError::Config(m) if m.contains("SW_RUN_VERSION")));

        let env = vars(&[("SW_RUN_VERSION", "v"), ("SW_STEP", "evaluate"), ("SW_TASK_INDEX", "x")]);
        assert!(matches!(context_from_vars(|k| env.get(k).cloned()), Err(PersistenceError::Config(_))));
    }
}

//! API de logging para los callbacks del usuario.
//!
//! Una instancia por identidad de run. En lugar de un singleton ambiental,
//! el worker construye un `LogStoreRegistry` al arrancar y pasa la instancia
//! por referencia a quien la necesite; sólo la creación pasa por el lock.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;
use serde_json::Value;

use super::{DataStore, Evaluation, RecordIter};
use crate::errors::EvalError;
use crate::model::{Metrics, RowIndex, RunContext, RunIdentity};

pub struct EvaluationLogStore {
    datastore: Evaluation,
}

impl EvaluationLogStore {
    pub fn new(identity: RunIdentity, store: Arc<dyn DataStore>) -> Self {
        Self { datastore: Evaluation::new(identity, store) }
    }

    pub fn identity(&self) -> &RunIdentity {
        self.datastore.identity()
    }

    /// Escribe `metrics` como la fila `id` de la tabla `category`.
    ///
    /// Repetir (category, id) mezcla campos según el almacén; aquí no se
    /// deduplica nada.
    pub fn log(&self, category: &str, id: impl Into<RowIndex>, metrics: Metrics) -> Result<(), EvalError> {
        self.datastore.log(category, &id.into(), metrics)
    }

    /// Mezcla métricas en la tabla de resumen del run.
    ///
    /// ```ignore
    /// store.log_summary(SummaryArgs::new().kw("loss", 0.99))?;
    /// store.log_summary(SummaryArgs::new().arg(json!({"loss": 0.99, "accuracy": 0.98})))?;
    /// ```
    pub fn log_summary(&self, args: SummaryArgs) -> Result<(), EvalError> {
        let metrics = args.resolve()?;
        self.datastore.log_metrics(metrics)
    }

    /// Atajo para un único mapa de métricas.
    pub fn log_summary_map(&self, metrics: Metrics) -> Result<(), EvalError> {
        self.datastore.log_metrics(metrics)
    }

    /// Filas escritas en `category` por cualquier worker del mismo run.
    pub fn iter(&self, category: &str) -> Result<RecordIter, EvalError> {
        self.datastore.get(category)
    }

    pub fn summary(&self) -> Result<Option<Metrics>, EvalError> {
        self.datastore.summary()
    }
}

impl std::fmt::Display for EvaluationLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.datastore)
    }
}

/// Argumentos de `log_summary`: un único mapa posicional o pares clave/valor,
/// nunca ambos.
#[derive(Debug, Clone, Default)]
pub struct SummaryArgs {
    positional: Vec<Value>,
    keywords: Metrics,
}

impl SummaryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kw(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }

    pub fn resolve(self) -> Result<Metrics, EvalError> {
        let SummaryArgs { mut positional, keywords } = self;
        match positional.len() {
            0 => Ok(keywords),
            1 => {
                if !keywords.is_empty() {
                    return Err(EvalError::config(format!("Args({}) and kwargs({:?}) are specified at the same time",
                                                         positional[0], keywords)));
                }
                match positional.remove(0) {
                    Value::Object(map) => Ok(map.into_iter().collect()),
                    other => Err(EvalError::config(format!("Args({other}) is not dict type"))),
                }
            }
            n => Err(EvalError::config(format!("The number of args({n}) is greater than one"))),
        }
    }
}

impl From<Metrics> for SummaryArgs {
    fn from(metrics: Metrics) -> Self {
        Self { positional: Vec::new(),
               keywords: metrics }
    }
}

/// Una `EvaluationLogStore` por identidad de run.
pub struct LogStoreRegistry {
    store: Arc<dyn DataStore>,
    instances: Mutex<HashMap<RunIdentity, Arc<EvaluationLogStore>>>,
}

impl LogStoreRegistry {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store,
               instances: Mutex::new(HashMap::new()) }
    }

    pub fn data_store(&self) -> Arc<dyn DataStore> {
        self.store.clone()
    }

    /// Devuelve la instancia del run de `ctx`, creándola la primera vez.
    pub fn get_or_create(&self, ctx: &RunContext) -> Arc<EvaluationLogStore> {
        let identity = ctx.identity();
        let mut instances = self.instances.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        instances.entry(identity.clone())
                 .or_insert_with(|| {
                     debug!("creating evaluation log store for {identity:?}");
                     Arc::new(EvaluationLogStore::new(identity, self.store.clone()))
                 })
                 .clone()
    }

    pub fn len(&self) -> usize {
        self.instances.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDataStore;
    use serde_json::json;

    fn log_store() -> EvaluationLogStore {
        EvaluationLogStore::new(RunIdentity { project: "self".into(),
                                              version: "v1".into() },
                                Arc::new(InMemoryDataStore::new()))
    }

    #[test]
    fn summary_rejects_positional_and_keywords() {
        let err = SummaryArgs::new().arg(json!({"a": 1})).kw("b", 2).resolve().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn summary_rejects_non_map_and_extra_positionals() {
        assert!(SummaryArgs::new().arg(json!(1)).resolve().unwrap_err().is_configuration());
        assert!(SummaryArgs::new().arg(json!({})).arg(json!({})).resolve().unwrap_err().is_configuration());
    }

    #[test]
    fn keywords_equal_single_map() {
        let a = SummaryArgs::new().kw("a", 1).kw("b", 2).resolve().unwrap();
        let b = SummaryArgs::new().arg(json!({"a": 1, "b": 2})).resolve().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn log_and_iter_category() {
        let store = log_store();
        store.log("label/1", 1, [("loss".to_string(), json!(0.99))].into_iter().collect()).unwrap();
        store.log("label/1", "x", [("loss".to_string(), json!(0.5))].into_iter().collect()).unwrap();
        let rows: Vec<_> = store.iter("label/1").unwrap().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].id, RowIndex::Str("x".into()));
        assert_eq!(store.iter("label/2").unwrap().count(), 0);
    }

    #[test]
    fn registry_returns_one_instance_per_identity() {
        let registry = LogStoreRegistry::new(Arc::new(InMemoryDataStore::new()));
        let ctx = RunContext::new("self", "v1", "predict", 0, vec![]);
        let a = registry.get_or_create(&ctx);
        let b = registry.get_or_create(&ctx.for_task("evaluate", 0));
        assert!(Arc::ptr_eq(&a, &b));
        let c = registry.get_or_create(&RunContext::new("self", "v2", "predict", 0, vec![]));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registry_len_survives_poisoned_lock() {
        let registry = Arc::new(LogStoreRegistry::new(Arc::new(InMemoryDataStore::new())));
        registry.get_or_create(&RunContext::new("self", "v1", "predict", 0, vec![]));
        let other = registry.clone();
        let _ = std::thread::spawn(move || {
                    let _guard = other.instances.lock().unwrap();
                    panic!("poison the registry lock");
                })
                .join();
        assert!(registry.instances.is_poisoned());
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }
}

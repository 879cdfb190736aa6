//! Constantes del núcleo de evaluación.
//!
//! Algunas participan en formatos observables desde fuera del proceso
//! (nombres de fichero de estado, separador de `index_with_dataset`); cambiarlas
//! rompe la compatibilidad con los consumidores de esos artefactos.

/// Separador entre el prefijo del dataset y el índice crudo de la fila.
pub const INDEX_JOIN_STR: &str = "_#@#_";

/// Tipo de recurso que precede a nombre/versión en el prefijo del índice.
pub const DATASET_RESOURCE_TYPE: &str = "dataset";

/// Nombre del fichero con el estado actual del run.
pub const CURRENT_FNAME: &str = "current";

/// Nombre del journal append-only de la timeline.
pub const TIMELINE_FNAME: &str = "timeline";

/// Tabla donde el predict deja los `ResultRecord`.
pub const RESULTS_TABLE: &str = "results";

/// Tabla de resumen (una fila por run, id = versión del run).
pub const SUMMARY_TABLE: &str = "summary";

pub const STAGE_PREDICT: &str = "predict";
pub const STAGE_EVALUATE: &str = "evaluate";

pub const DEFAULT_BATCH_SIZE: usize = 1;
pub const DEFAULT_CONCURRENCY: u32 = 1;
pub const DEFAULT_PREDICT_REPLICAS: u32 = 2;

/// Capacidad por defecto del buffer de resultados del `Evaluation`.
pub const DEFAULT_RESULT_BUFFER: usize = 64;

/// Filas que entrega el coordinador en cada lease de consumo distribuido.
pub const DEFAULT_LEASE_SIZE: usize = 16;

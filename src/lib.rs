//! evalflow-rust
//!
//! Job de ejemplo y punto de entrada de los workers:
//! - `demo` define el dataset, los callbacks y el grafo del job.
//! - El binario `main-core` conecta el job con el backend local.
//!
//! El núcleo vive en `eval-core`; la persistencia local en `eval-persistence`.

pub mod demo;

pub use demo::{job_graph, run_local, seed_dataset, DemoReport};

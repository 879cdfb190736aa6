//! Worker `main-core`.
//!
//! - Con `SW_STEP` definido ejecuta un único worker (el scheduler externo
//!   inyecta `SW_*`). El catálogo de demo vive en memoria del proceso, así
//!   que el reparto por sesión sólo coordina réplicas dentro de este mismo
//!   proceso: varios procesos con la misma sesión verían todas las filas.
//! - Sin él ejecuta el job completo en local: réplicas de predict en
//!   paralelo y luego evaluate.
use std::error::Error;
use std::sync::Arc;

use eval_core::{InMemoryDatasetCatalog, PipelineHandler, RunContext, StepOutcome};
use eval_persistence::{context_from_env, init_dotenv, LocalBackend};
use evalflow_rust::demo;
use log::info;
use tracing_subscriber::EnvFilter;

const DEMO_ROWS: i64 = 64;
const DEMO_REPLICAS: u32 = 2;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                                                 EnvFilter::new("info,eval_core=info,eval_persistence=info")
                                             }))
                             .init();
    init_dotenv();

    let backend = LocalBackend::from_env();
    let catalog = Arc::new(InMemoryDatasetCatalog::new());
    let uri = demo::seed_dataset(&catalog, DEMO_ROWS, &[13, 42]);
    let graph = demo::job_graph(&uri.to_string(), DEMO_REPLICAS)?;
    info!("job graph {} with {} stages", graph.graph_hash(), graph.len());

    if std::env::var("SW_STEP").is_ok() {
        let ctx: RunContext = context_from_env()?;
        info!("running worker {ctx}");
        let builder = backend.handler_builder(ctx)?.datasets(catalog);
        let mut handler: PipelineHandler = graph.bind(builder)?.build()?;
        match handler.run_step()? {
            StepOutcome::Predict(summary) => info!("{handler}: {summary:?}"),
            StepOutcome::Evaluate => info!("{handler}: evaluate done"),
        }
        handler.close()?;
        return Ok(());
    }

    let version = RunContext::generate_version();
    let report = demo::run_local(&backend, catalog, &graph, "self", &version)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

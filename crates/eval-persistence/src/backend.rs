//! Backend local: conecta un `PipelineHandlerBuilder` a los ficheros del run.
use std::sync::Arc;

use eval_core::{LogStoreRegistry, PipelineHandlerBuilder, RunContext};
use log::info;

use crate::config::StoreConfig;
use crate::datastore::LocalDataStore;
use crate::error::PersistenceError;
use crate::layout::RunLayout;
use crate::status::FsStatusStore;
use crate::timeline::JsonlTimelineWriter;

/// Estado compartido por todos los workers de un proceso.
pub struct LocalBackend {
    config: StoreConfig,
    layout: RunLayout,
    store: Arc<LocalDataStore>,
    log_stores: LogStoreRegistry,
}

impl LocalBackend {
    pub fn open(config: StoreConfig) -> Self {
        let layout = RunLayout::new(config.root.clone());
        let store = Arc::new(LocalDataStore::new(layout.datastore_dir()));
        info!("local backend at {}", layout.root().display());
        Self { config,
               layout,
               log_stores: LogStoreRegistry::new(store.clone()),
               store }
    }

    pub fn from_env() -> Self {
        Self::open(StoreConfig::from_env())
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn data_store(&self) -> Arc<LocalDataStore> {
        self.store.clone()
    }

    pub fn log_stores(&self) -> &LogStoreRegistry {
        &self.log_stores
    }

    /// Builder con status, timeline, almacén y log store del worker `ctx`.
    /// Los callbacks y el opener de datasets los añade el llamador.
    pub fn handler_builder(&self, ctx: RunContext) -> Result<PipelineHandlerBuilder, PersistenceError> {
        let status = FsStatusStore::new(self.layout.status_file(&ctx)?);
        let timeline = JsonlTimelineWriter::create(self.layout.timeline_file(&ctx)?)?;
        let log_store = self.log_stores.get_or_create(&ctx);
        Ok(PipelineHandlerBuilder::new(ctx).status_store(status)
                                           .timeline(timeline)
                                           .data_store(self.store.clone())
                                           .log_store(log_store)
                                           .result_buffer(self.config.result_buffer))
    }
}

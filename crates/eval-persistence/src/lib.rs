//! eval-persistence
//!
//! Backend local (sistema de ficheros) para el núcleo de evaluación.
//!
//! Módulos:
//! - `layout`: rutas del run bajo la raíz configurada.
//! - `status`: fichero `current` con el estado del worker.
//! - `timeline`: journal JSON lines por worker.
//! - `datastore`: tablas del almacén estructurado como JSON lines.
//! - `config`: carga de configuración desde .env / entorno.
//! - `backend`: ensambla lo anterior para construir handlers.

pub mod backend;
pub mod config;
pub mod datastore;
pub mod error;
pub mod layout;
pub mod status;
pub mod timeline;

pub use backend::LocalBackend;
pub use config::{context_from_env, init_dotenv, StoreConfig};
pub use datastore::LocalDataStore;
pub use error::PersistenceError;
pub use layout::RunLayout;
pub use status::FsStatusStore;
pub use timeline::{read_timeline, JsonlTimelineWriter};

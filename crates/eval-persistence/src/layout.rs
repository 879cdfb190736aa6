//! Disposición de ficheros bajo la raíz del backend local.
//!
//! ```text
//! <root>/project/<project>/job/<version[:2]>/<version>/runlog/<step>/<index>/{current,timeline}
//! <root>/datastore/<table>.jsonl
//! ```
use std::path::{Component, Path, PathBuf};

use eval_core::constants::{CURRENT_FNAME, TIMELINE_FNAME};
use eval_core::RunContext;

use crate::error::PersistenceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, ctx: &RunContext) -> Result<PathBuf, PersistenceError> {
        let version = ctx.version();
        let shard: String = version.chars().take(2).collect();
        Ok(self.root
               .join("project")
               .join(safe_segment(ctx.project())?)
               .join("job")
               .join(safe_segment(&shard)?)
               .join(safe_segment(version)?))
    }

    /// Directorio de estado de un worker (step, index).
    pub fn runlog_dir(&self, ctx: &RunContext) -> Result<PathBuf, PersistenceError> {
        Ok(self.job_dir(ctx)?
               .join("runlog")
               .join(safe_segment(ctx.step())?)
               .join(ctx.index().to_string()))
    }

    pub fn status_file(&self, ctx: &RunContext) -> Result<PathBuf, PersistenceError> {
        Ok(self.runlog_dir(ctx)?.join(CURRENT_FNAME))
    }

    pub fn timeline_file(&self, ctx: &RunContext) -> Result<PathBuf, PersistenceError> {
        Ok(self.runlog_dir(ctx)?.join(TIMELINE_FNAME))
    }

    pub fn datastore_dir(&self) -> PathBuf {
        self.root.join("datastore")
    }
}

/// Un nombre usable como componente de ruta (sin separadores ni `..`).
pub(crate) fn safe_segment(name: &str) -> Result<&str, PersistenceError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(PersistenceError::Config(format!("invalid path segment {name:?}"))),
    }
}

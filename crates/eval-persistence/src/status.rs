//! Fichero de estado actual (`current`) de un worker.
use std::fs;
use std::path::{Path, PathBuf};

use eval_core::{EvalError, RunStatus, StatusStore};
use log::debug;

use crate::error::PersistenceError;

/// Sobrescribe `current` en cada transición (escritura a temporal + rename,
/// así un lector nunca ve el fichero a medias).
#[derive(Debug, Clone)]
pub struct FsStatusStore {
    path: PathBuf,
}

impl FsStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Estado persistido, si existe.
    pub fn read(&self) -> Result<Option<RunStatus>, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => RunStatus::parse(raw.trim()).map(Some)
                                                   .ok_or_else(|| PersistenceError::Serialization(format!("unknown status {raw:?}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, status: RunStatus) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, status.as_str())?;
        fs::rename(&tmp, &self.path)?;
        debug!("status {status} -> {}", self.path.display());
        Ok(())
    }
}

impl StatusStore for FsStatusStore {
    fn write_status(&mut self, status: RunStatus) -> Result<(), EvalError> {
        Ok(self.write(status)?)
    }
}

//! Timeline en JSON lines: un objeto por evento, vaciado tras cada escritura.
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use eval_core::{EvalError, TimelineEvent, TimelineWriter};
use log::debug;

use crate::error::PersistenceError;

pub struct JsonlTimelineWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonlTimelineWriter {
    /// Crea (o trunca) el fichero de timeline.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true)
                                     .write(true)
                                     .truncate(true)
                                     .open(&path)?;
        Ok(Self { path,
                  writer: Some(BufWriter::new(file)) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_event(&mut self, event: &TimelineEvent) -> Result<(), PersistenceError> {
        let writer = self.writer
                         .as_mut()
                         .ok_or_else(|| PersistenceError::Io(format!("timeline {} is closed", self.path.display())))?;
        serde_json::to_writer(&mut *writer, event)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl TimelineWriter for JsonlTimelineWriter {
    fn append(&mut self, event: &TimelineEvent) -> Result<(), EvalError> {
        Ok(self.write_event(event)?)
    }

    fn close(&mut self) -> Result<(), EvalError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(PersistenceError::from)?;
            debug!("timeline closed: {}", self.path.display());
        }
        Ok(())
    }
}

/// Lee todos los eventos de una timeline (herramientas y tests).
pub fn read_timeline(path: &Path) -> Result<Vec<TimelineEvent>, PersistenceError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}

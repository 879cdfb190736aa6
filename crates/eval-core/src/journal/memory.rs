//! Backends en memoria. Son handles clonables: el test conserva un clon para
//! inspeccionar lo escrito después de mover el otro al handler.
use std::sync::{Arc, Mutex, MutexGuard};

use super::{StatusStore, TimelineWriter};
use crate::errors::EvalError;
use crate::model::{RunStatus, TimelineEvent};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Default)]
pub struct InMemoryStatusStore {
    inner: Arc<Mutex<Vec<RunStatus>>>,
}

impl InMemoryStatusStore {
    pub fn current(&self) -> Option<RunStatus> {
        lock(&self.inner).last().copied()
    }

    pub fn history(&self) -> Vec<RunStatus> {
        lock(&self.inner).clone()
    }
}

impl StatusStore for InMemoryStatusStore {
    fn write_status(&mut self, status: RunStatus) -> Result<(), EvalError> {
        lock(&self.inner).push(status);
        Ok(())
    }
}

#[derive(Default)]
struct TimelineState {
    events: Vec<TimelineEvent>,
    closed: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryTimeline {
    inner: Arc<Mutex<TimelineState>>,
}

impl InMemoryTimeline {
    pub fn events(&self) -> Vec<TimelineEvent> {
        lock(&self.inner).events.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }
}

impl TimelineWriter for InMemoryTimeline {
    fn append(&mut self, event: &TimelineEvent) -> Result<(), EvalError> {
        let mut st = lock(&self.inner);
        if st.closed {
            return Err(EvalError::JournalClosed);
        }
        st.events.push(event.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), EvalError> {
        lock(&self.inner).closed = true;
        Ok(())
    }
}

//! Host externo que ejecuta el grafo: aquí solo se le entregan registraciones.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::stage::{ExtraConfig, Resources, StageCallback};
use crate::errors::EvalError;

/// Equivalente a `register(name, resources, concurrency, needs, replicas,
/// extra_kwargs)(callback)` del host de ejecución.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRegistration {
    pub name: String,
    pub callback_name: String,
    pub resources: Resources,
    pub concurrency: u32,
    pub needs: Vec<String>,
    pub replicas: u32,
    pub extra_kwargs: ExtraConfig,
}

pub trait JobHost {
    fn register(&mut self, registration: StageRegistration, callback: StageCallback) -> Result<(), EvalError>;
}

/// Host en memoria (tests y ejecución local).
#[derive(Default)]
pub struct InMemoryJobHost {
    registrations: Vec<StageRegistration>,
    callbacks: IndexMap<String, StageCallback>,
}

impl InMemoryJobHost {
    pub fn registrations(&self) -> &[StageRegistration] {
        &self.registrations
    }

    pub fn callback(&self, name: &str) -> Option<&StageCallback> {
        self.callbacks.get(name)
    }
}

impl JobHost for InMemoryJobHost {
    fn register(&mut self, registration: StageRegistration, callback: StageCallback) -> Result<(), EvalError> {
        if self.callbacks.contains_key(&registration.name) {
            return Err(EvalError::config(format!("stage {} is already registered", registration.name)));
        }
        self.callbacks.insert(registration.name.clone(), callback);
        self.registrations.push(registration);
        Ok(())
    }
}

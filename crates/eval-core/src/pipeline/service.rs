//! Superficie de servicio: expone callbacks como API request/response.
//!
//! El núcleo sólo registra las APIs; servirlas por red es cosa de un
//! `ServiceHost` externo.
use std::sync::Arc;

use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{CallbackResult, EvalError};

pub type ApiFn = Arc<dyn Fn(Value) -> CallbackResult<Value> + Send + Sync>;

/// Descripción de una API: nombre y esquemas de entrada/salida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSpec {
    pub name: String,
    pub input: Value,
    pub output: Value,
}

pub trait ServiceHost: Send {
    fn serve(&mut self, addr: &str, port: u16, apis: &[ApiSpec]) -> Result<(), EvalError>;
}

#[derive(Default)]
pub struct Service {
    apis: IndexMap<String, (ApiSpec, ApiFn)>,
    host: Option<Box<dyn ServiceHost>>,
}

impl Service {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(host: Box<dyn ServiceHost>) -> Self {
        Self { apis: IndexMap::new(),
               host: Some(host) }
    }

    pub fn add_api(&mut self, input: Value, output: Value, func: ApiFn, name: &str) -> Result<(), EvalError> {
        if self.apis.contains_key(name) {
            return Err(EvalError::config(format!("api {name} already registered")));
        }
        let spec = ApiSpec { name: name.to_string(),
                             input,
                             output };
        self.apis.insert(name.to_string(), (spec, func));
        Ok(())
    }

    pub fn apis(&self) -> Vec<ApiSpec> {
        self.apis.values().map(|(spec, _)| spec.clone()).collect()
    }

    /// Invoca una API registrada en proceso.
    pub fn invoke(&self, name: &str, payload: Value) -> Result<Value, EvalError> {
        let (_, func) = self.apis
                            .get(name)
                            .ok_or_else(|| EvalError::config(format!("api {name} not found")))?;
        func(payload).map_err(|e| EvalError::StageFailure(e.to_string()))
    }

    pub fn serve(&mut self, addr: &str, port: u16) -> Result<(), EvalError> {
        let apis = self.apis();
        let host = self.host
                       .as_mut()
                       .ok_or_else(|| EvalError::config("no service host bound"))?;
        info!("serving {} apis on {addr}:{port}", apis.len());
        host.serve(addr, port, &apis)
    }
}

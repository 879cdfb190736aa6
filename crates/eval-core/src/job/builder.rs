//! Registro declarativo de stages y construcción del `JobGraph`.
//!
//! Se usa al definir el job, nunca durante la ejecución: valida cada stage
//! al registrarlo (roles, `needs`, recursos, réplicas) y en `build()` valida
//! el grafo completo (dependencias existentes, sin ciclos).
//!
//! Ejemplo de uso (comentario):
//!
//! ```ignore
//! let mut b = JobGraphBuilder::new();
//! b.predict("predict_image", |input| Ok(json!(1)))?
//!  .evaluate("evaluate_results",
//!            EvaluateOptions::default().needs(&["predict_image"]),
//!            |results, store| Ok(()))?;
//! let graph = b.build()?;
//! ```

use std::collections::{HashMap, VecDeque};

use log::debug;
use serde_json::Value;

use super::graph::JobGraph;
use super::stage::{require_positive, validate_resources, EvaluateOptions, PredictOptions, StageCallback, StageNode,
                   StageRole};
use crate::errors::{CallbackResult, EvalError};
use crate::pipeline::{EvaluateInput, EvaluateRole, PredictInput, PredictRole, RoleSlot};
use crate::store::EvaluationLogStore;

/// Un stage predict-class y uno evaluate-class como máximo.
#[derive(Default)]
pub struct JobGraphBuilder {
    predict: RoleSlot<StageNode>,
    evaluate: RoleSlot<StageNode>,
}

impl JobGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro "desnudo": opciones por defecto.
    pub fn predict<F>(&mut self, callback_name: &str, f: F) -> Result<&mut Self, EvalError>
        where F: Fn(PredictInput<'_>) -> CallbackResult<Value> + Send + Sync + 'static
    {
        self.register_predict(callback_name, PredictRole::predict(f), PredictOptions::default())
    }

    pub fn predict_with<F>(&mut self, callback_name: &str, options: PredictOptions, f: F) -> Result<&mut Self, EvalError>
        where F: Fn(PredictInput<'_>) -> CallbackResult<Value> + Send + Sync + 'static
    {
        self.register_predict(callback_name, PredictRole::predict(f), options)
    }

    pub fn ppl<F>(&mut self, callback_name: &str, options: PredictOptions, f: F) -> Result<&mut Self, EvalError>
        where F: Fn(PredictInput<'_>) -> CallbackResult<Value> + Send + Sync + 'static
    {
        self.register_predict(callback_name, PredictRole::ppl(f), options)
    }

    /// Evaluate no tiene forma desnuda: `needs` es obligatorio.
    pub fn evaluate<F>(&mut self, callback_name: &str, options: EvaluateOptions, f: F) -> Result<&mut Self, EvalError>
        where F: Fn(EvaluateInput, &EvaluationLogStore) -> CallbackResult<()> + Send + Sync + 'static
    {
        self.register_evaluate(callback_name, EvaluateRole::evaluate(f), options)
    }

    pub fn cmp<F>(&mut self, callback_name: &str, options: EvaluateOptions, f: F) -> Result<&mut Self, EvalError>
        where F: Fn(EvaluateInput, &EvaluationLogStore) -> CallbackResult<()> + Send + Sync + 'static
    {
        self.register_evaluate(callback_name, EvaluateRole::cmp(f), options)
    }

    pub fn register_predict(&mut self,
                            callback_name: &str,
                            role: PredictRole,
                            options: PredictOptions)
                            -> Result<&mut Self, EvalError> {
        self.check_callback_name(callback_name)?;
        validate_resources(&options.resources)?;
        require_positive("concurrency", options.concurrency)?;
        require_positive("replicas", options.replicas)?;
        let node = StageNode { role: StageRole::Predict,
                               callback_name: callback_name.to_string(),
                               callback: StageCallback::Predict(role),
                               needs: options.needs.clone(),
                               resources: options.resources.clone(),
                               concurrency: options.concurrency,
                               replicas: options.replicas,
                               extra_config: options.extra_config()? };
        self.predict.assign(node)?;
        debug!("registered predict stage {callback_name}");
        Ok(self)
    }

    /// Evaluate corre siempre con concurrency 1 y una réplica.
    pub fn register_evaluate(&mut self,
                             callback_name: &str,
                             role: EvaluateRole,
                             options: EvaluateOptions)
                             -> Result<&mut Self, EvalError> {
        if options.needs.is_empty() {
            return Err(EvalError::config("needs is required for evaluate function"));
        }
        self.check_callback_name(callback_name)?;
        validate_resources(&options.resources)?;
        let node = StageNode { role: StageRole::Evaluate,
                               callback_name: callback_name.to_string(),
                               callback: StageCallback::Evaluate(role),
                               needs: options.needs.clone(),
                               resources: options.resources.clone(),
                               concurrency: 1,
                               replicas: 1,
                               extra_config: options.extra_config()? };
        self.evaluate.assign(node)?;
        debug!("registered evaluate stage {callback_name}");
        Ok(self)
    }

    fn check_callback_name(&self, name: &str) -> Result<(), EvalError> {
        if name.trim().is_empty() {
            return Err(EvalError::config("callback name cannot be empty"));
        }
        let taken = [self.predict.get(), self.evaluate.get()].into_iter()
                                                             .flatten()
                                                             .any(|n| n.callback_name == name);
        if taken {
            return Err(EvalError::config(format!("callback {name} is already registered")));
        }
        Ok(())
    }

    /// Valida dependencias y ordena los stages topológicamente.
    pub fn build(&self) -> Result<JobGraph, EvalError> {
        let nodes: Vec<StageNode> = [self.predict.get(), self.evaluate.get()].into_iter()
                                                                             .flatten()
                                                                             .cloned()
                                                                             .collect();
        if nodes.is_empty() {
            return Err(EvalError::config("job graph has no stages"));
        }

        let position: HashMap<&str, usize> = nodes.iter()
                                                  .enumerate()
                                                  .map(|(i, n)| (n.callback_name.as_str(), i))
                                                  .collect();
        let mut indegree = vec![0usize; nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for need in &node.needs {
                if *need == node.callback_name {
                    return Err(EvalError::config(format!("stage {need} cannot depend on itself")));
                }
                let dep = *position.get(need.as_str())
                                   .ok_or_else(|| EvalError::config(format!("stage {} needs unknown stage {need}", node.callback_name)))?;
                indegree[i] += 1;
                dependents[dep].push(i);
            }
        }

        // Kahn, estable respecto al orden de registro.
        let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|i| indegree[*i] == 0).collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(i) = ready.pop_front() {
            order.push(i);
            for &d in &dependents[i] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    ready.push_back(d);
                }
            }
        }
        if order.len() != nodes.len() {
            return Err(EvalError::config("stage dependencies contain a cycle"));
        }

        let mut slots: Vec<Option<StageNode>> = nodes.into_iter().map(Some).collect();
        let stages = order.into_iter().filter_map(|i| slots[i].take()).collect();
        Ok(JobGraph::new(stages))
    }
}

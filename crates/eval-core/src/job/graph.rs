//! `JobGraph`: grafo inmutable resultado de `JobGraphBuilder::build`.
use serde_json::{json, Value};

use super::host::{JobHost, StageRegistration};
use super::stage::{StageCallback, StageNode, StageRole};
use crate::errors::EvalError;
use crate::hashing::hash_value;
use crate::pipeline::PipelineHandlerBuilder;

/// Stages en orden topológico + hash determinista de su definición.
#[derive(Debug, Clone)]
pub struct JobGraph {
    stages: Vec<StageNode>,
    graph_hash: String,
}

impl JobGraph {
    pub(crate) fn new(stages: Vec<StageNode>) -> Self {
        let described: Vec<Value> = stages.iter().map(StageNode::describe).collect();
        let graph_hash = hash_value(&json!({ "stages": described }));
        Self { stages, graph_hash }
    }

    pub fn stages(&self) -> &[StageNode] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn graph_hash(&self) -> &str {
        &self.graph_hash
    }

    pub fn stage(&self, role: StageRole) -> Option<&StageNode> {
        self.stages.iter().find(|s| s.role == role)
    }

    pub fn stage_for_step(&self, step: &str) -> Option<&StageNode> {
        StageRole::from_step(step).and_then(|role| self.stage(role))
    }

    /// Manifest JSON para el scheduler externo.
    pub fn manifest(&self) -> Value {
        json!({
            "graph_hash": self.graph_hash,
            "stages": self.stages.iter().map(StageNode::describe).collect::<Vec<_>>(),
        })
    }

    /// Emite una registración por stage, en orden topológico.
    pub fn register_into(&self, host: &mut dyn JobHost) -> Result<(), EvalError> {
        for stage in &self.stages {
            let registration = StageRegistration { name: stage.role.name().to_string(),
                                                   callback_name: stage.callback_name.clone(),
                                                   resources: stage.resources.clone(),
                                                   concurrency: stage.concurrency,
                                                   needs: stage.needs.clone(),
                                                   replicas: stage.replicas,
                                                   extra_kwargs: stage.extra_config.clone() };
            host.register(registration, stage.callback.clone())?;
        }
        Ok(())
    }

    /// Configura el builder de un worker con el stage de su `step`.
    pub fn bind(&self, builder: PipelineHandlerBuilder) -> Result<PipelineHandlerBuilder, EvalError> {
        let step = builder.context().step().to_string();
        let stage = self.stage_for_step(&step)
                        .ok_or_else(|| EvalError::config(format!("job graph has no stage for step {step}")))?;
        let builder = builder.config(stage.pipeline_config()?);
        Ok(match &stage.callback {
            StageCallback::Predict(role) => builder.predict_role(role.clone()),
            StageCallback::Evaluate(role) => builder.evaluate_role(role.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::errors::CallbackResult;
    use crate::job::{EvaluateOptions, InMemoryJobHost, JobGraphBuilder, PredictOptions};
    use crate::pipeline::EvaluateInput;
    use crate::store::EvaluationLogStore;

    fn noop_eval(_: EvaluateInput, _: &EvaluationLogStore) -> CallbackResult<()> {
        Ok(())
    }

    fn graph(batch: usize) -> JobGraph {
        let mut b = JobGraphBuilder::new();
        b.evaluate("evaluate_results", EvaluateOptions::default().needs(&["predict_image"]), noop_eval)
         .unwrap()
         .predict_with("predict_image",
                       PredictOptions::default().batch_size(batch).resource("gpu", 1),
                       |_| Ok(json!(0)))
         .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn stages_are_topologically_ordered() {
        let g = graph(1);
        let names: Vec<_> = g.stages().iter().map(|s| s.role.name()).collect();
        assert_eq!(names, vec!["predict", "evaluate"]);
        assert_eq!(g.stage(StageRole::Evaluate).unwrap().replicas, 1);
        assert_eq!(g.stage(StageRole::Predict).unwrap().replicas, 2);
    }

    #[test]
    fn hash_depends_on_stage_config() {
        assert_eq!(graph(1).graph_hash(), graph(1).graph_hash());
        assert_ne!(graph(1).graph_hash(), graph(8).graph_hash());
        assert_eq!(graph(1).manifest()["stages"][1]["needs"], json!(["predict_image"]));
    }

    #[test]
    fn registers_every_stage() {
        let g = graph(4);
        let mut host = InMemoryJobHost::default();
        g.register_into(&mut host).unwrap();
        let regs = host.registrations();
        assert_eq!(regs.len(), 2);
        assert_eq!(regs[0].name, "predict");
        assert_eq!(regs[0].extra_kwargs["predict_batch_size"], json!(4));
        assert_eq!(regs[0].extra_kwargs["ignore_error"], json!(false));
        assert_eq!(regs[1].concurrency, 1);
        assert_eq!(regs[1].extra_kwargs["predict_auto_log"], json!(true));
        assert!(host.callback("evaluate").is_some());
        // Registrar dos veces el mismo stage es un error del host.
        assert!(g.register_into(&mut host).is_err());
    }
}

//! Identidad inmutable de un worker dentro de un job distribuido.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Descripción de un worker: proyecto, versión del run (también usada como
/// session id del consumo distribuido), stage (`step`), índice del worker y
/// datasets a consumir.
///
/// Se construye una vez al arrancar el worker y no se muta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    project: String,
    version: String,
    step: String,
    index: u32,
    dataset_refs: Vec<String>,
}

/// Clave lógica de un run: todas las instancias de `EvaluationLogStore` con la
/// misma identidad comparten tablas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    pub project: String,
    pub version: String,
}

impl RunContext {
    pub fn new(project: impl Into<String>,
               version: impl Into<String>,
               step: impl Into<String>,
               index: u32,
               dataset_refs: Vec<String>)
               -> Self {
        Self { project: project.into(),
               version: version.into(),
               step: step.into(),
               index,
               dataset_refs }
    }

    /// Genera una versión nueva (uuid v4 sin guiones) para un run local.
    pub fn generate_version() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Session id del consumo distribuido: la versión del run.
    pub fn session_id(&self) -> &str {
        &self.version
    }

    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn dataset_refs(&self) -> &[String] {
        &self.dataset_refs
    }

    pub fn identity(&self) -> RunIdentity {
        RunIdentity { project: self.project.clone(),
                      version: self.version.clone() }
    }

    /// Contexto hermano para otro stage/índice del mismo run.
    pub fn for_task(&self, step: impl Into<String>, index: u32) -> Self {
        Self { step: step.into(),
               index,
               ..self.clone() }
    }
}

impl std::fmt::Display for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}-{}", self.project, self.version, self.step, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_task_keeps_identity() {
        let ctx = RunContext::new("self", "v1", "predict", 0, vec!["mnist/version/v1".into()]);
        let other = ctx.for_task("evaluate", 3);
        assert_eq!(other.identity(), ctx.identity());
        assert_eq!(other.step(), "evaluate");
        assert_eq!(other.index(), 3);
        assert_eq!(other.dataset_refs(), ctx.dataset_refs());
        assert_eq!(other.to_string(), "self/v1@evaluate-3");
    }

    #[test]
    fn generated_versions_differ() {
        assert_ne!(RunContext::generate_version(), RunContext::generate_version());
    }
}

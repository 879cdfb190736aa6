use serde::{Deserialize, Serialize};

use crate::constants::DATASET_RESOURCE_TYPE;
use crate::errors::EvalError;

const LATEST: &str = "latest";

/// Referencia a un dataset: `[project/<p>/][dataset/]<name>[/version/<v>]`
/// o `<name>/<v>`. Sin versión se asume `latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetUri {
    pub project: Option<String>,
    pub name: String,
    pub version: String,
}

impl DatasetUri {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { project: None,
               name: name.into(),
               version: version.into() }
    }

    pub fn parse(raw: &str) -> Result<Self, EvalError> {
        let invalid = || EvalError::config(format!("invalid dataset uri: {raw:?}"));
        let parts: Vec<&str> = raw.trim().split('/').filter(|p| !p.is_empty()).collect();
        if parts.iter().any(|p| p.chars().any(char::is_whitespace)) {
            return Err(invalid());
        }
        let mut rest = parts.as_slice();
        let mut project = None;
        if let ["project", p, tail @ ..] = rest {
            project = Some(p.to_string());
            rest = tail;
        }
        if let ["dataset", tail @ ..] = rest {
            rest = tail;
        }
        let (name, version) = match rest {
            [name] => (*name, LATEST),
            [name, "version", v] => (*name, *v),
            [name, v] if *v != "version" => (*name, *v),
            _ => return Err(invalid()),
        };
        Ok(Self { project,
                  name: name.to_string(),
                  version: version.to_string() })
    }

    pub fn is_latest(&self) -> bool {
        self.version == LATEST
    }

    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self { version: version.into(),
               ..self.clone() }
    }

    /// Prefijo de `index_with_dataset`: `dataset-<name>-<version>`.
    pub fn index_prefix(&self) -> String {
        format!("{DATASET_RESOURCE_TYPE}-{}-{}", self.name, self.version)
    }
}

impl std::fmt::Display for DatasetUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(p) = &self.project {
            write!(f, "project/{p}/")?;
        }
        write!(f, "dataset/{}/version/{}", self.name, self.version)
    }
}

//! Features de una fila: mapeo ordenado nombre -> valor JSON o artifact.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Artifact;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Artifact(Artifact),
    Json(Value),
}

impl From<Value> for FeatureValue {
    fn from(v: Value) -> Self {
        FeatureValue::Json(v)
    }
}

impl From<Artifact> for FeatureValue {
    fn from(a: Artifact) -> Self {
        FeatureValue::Artifact(a)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Features(IndexMap<String, FeatureValue>);

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.0.get(name)
    }

    /// Atajo para features JSON.
    pub fn json(&self, name: &str) -> Option<&Value> {
        match self.0.get(name) {
            Some(FeatureValue::Json(v)) => Some(v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureValue)> {
        self.0.iter()
    }

    pub fn artifacts_mut(&mut self) -> impl Iterator<Item = &mut Artifact> {
        self.0.values_mut().filter_map(|v| match v {
                               FeatureValue::Artifact(a) => Some(a),
                               FeatureValue::Json(_) => None,
                           })
    }

    /// Libera la cache de los artifacts con link; devuelve cuántos se liberaron.
    pub fn release_artifact_caches(&mut self) -> usize {
        self.artifacts_mut().filter_map(|a| a.clear_cache().then_some(())).count()
    }
}

impl FromIterator<(String, FeatureValue)> for Features {
    fn from_iter<I: IntoIterator<Item = (String, FeatureValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

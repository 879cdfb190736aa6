//! Artifacts binarios referenciados desde los features de una fila.
//!
//! Un `Artifact` describe un contenido (imagen, audio, ...) por su hash y,
//! opcionalmente, por un `link` al almacenamiento externo. Los bytes pueden
//! estar cacheados en memoria; la cache nunca se serializa y se libera
//! tras procesar la fila para acotar la memoria del worker.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hashing::hash_bytes;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Image,
    Audio,
    Video,
    Text,
    Binary,
}

// `FeatureValue` prueba este variant antes que JSON: sólo acepta campos propios.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip)]
    cache: Option<Vec<u8>>,
}

impl PartialEq for Artifact {
    // La cache no forma parte de la identidad.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.hash == other.hash && self.link == other.link
        && self.mime_type == other.mime_type && self.metadata == other.metadata
    }
}

impl Artifact {
    /// Artifact en línea: los bytes son el contenido, sin link externo.
    pub fn from_bytes(kind: ArtifactKind, bytes: Vec<u8>) -> Self {
        Self { kind,
               hash: hash_bytes(&bytes),
               link: None,
               mime_type: None,
               metadata: None,
               cache: Some(bytes) }
    }

    /// Artifact respaldado por un link; `bytes` es la copia ya descargada.
    pub fn linked(kind: ArtifactKind, link: impl Into<String>, bytes: Option<Vec<u8>>) -> Self {
        let hash = bytes.as_deref().map(hash_bytes).unwrap_or_default();
        Self { kind,
               hash,
               link: Some(link.into()),
               mime_type: None,
               metadata: None,
               cache: bytes }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.cache.as_deref()
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Libera los bytes cacheados. Sólo aplica a artifacts con link: sin link
    /// la cache es el único contenido.
    pub fn clear_cache(&mut self) -> bool {
        if self.link.is_some() && self.cache.is_some() {
            self.cache = None;
            true
        } else {
            false
        }
    }
}

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Storage key of an enrolled face embedding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingKey(String);

impl EmbeddingKey {
    /// The deterministic key for an identity's enrolment.
    pub fn for_identity(id: Id) -> Self {
        Self(format!("face_{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EmbeddingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How to locate an enrolment: either derive the key from an identity, or use
/// a key recorded on the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingRef {
    Identity(Id),
    Key(EmbeddingKey),
}

impl EmbeddingRef {
    pub fn key(&self) -> EmbeddingKey {
        match self {
            EmbeddingRef::Identity(id) => EmbeddingKey::for_identity(*id),
            EmbeddingRef::Key(key) => key.clone(),
        }
    }
}

/// A fixed-length face descriptor produced by the embedding extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f64>);

impl Embedding {
    /// Wrap raw extractor output. Returns `None` for empty or non-finite vectors.
    pub fn new(values: Vec<f64>) -> Option<Self> {
        let embedding = Self(values);
        embedding.is_well_formed().then_some(embedding)
    }

    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|v| v.is_finite())
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// An enrolled embedding as persisted, one per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEmbedding {
    #[serde(rename = "_id")]
    pub key: EmbeddingKey,
    pub identity_id: Id,
    pub embedding: Embedding,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl StoredEmbedding {
    pub fn new(identity_id: Id, embedding: Embedding) -> Self {
        Self {
            key: EmbeddingKey::for_identity(identity_id),
            identity_id,
            embedding,
            updated_at: Utc::now(),
        }
    }
}

//! Persistence seams for the ballot gate.
//!
//! Each concern is a trait so the gate can run against MongoDB in production
//! and against in-process maps in tests and tooling.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mongodb::bson::{self, Document};
use thiserror::Error;

use crate::model::{
    ballot::{Ballot, NewBallot},
    candidate::{Candidate, CandidateStatus, NewCandidate},
    election::Election,
    embedding::{Embedding, EmbeddingKey, EmbeddingRef, StoredEmbedding},
    identity::Identity,
    mongodb::Id,
};

#[cfg(test)]
mod memory;
mod mongo;

#[cfg(test)]
pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] mongodb::error::Error),
    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read access to the identity directory, plus linking of face enrolments.
#[rocket::async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_identity(&self, id: Id) -> StoreResult<Option<Identity>>;

    /// Record (or clear) the enrolment key on an identity.
    async fn link_embedding(&self, id: Id, key: Option<EmbeddingKey>) -> StoreResult<()>;
}

#[rocket::async_trait]
pub trait ElectionRepository: Send + Sync {
    async fn find_election(&self, id: Id) -> StoreResult<Option<Election>>;

    async fn find_candidate(&self, id: Id) -> StoreResult<Option<Candidate>>;

    /// The nomination an identity holds in an election, if any.
    async fn find_nomination(
        &self,
        election_id: Id,
        identity_id: Id,
    ) -> StoreResult<Option<Candidate>>;

    /// Insert a nomination. Fails with [`StoreError::Duplicate`] if the
    /// identity already holds one for the election.
    async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Candidate>;

    /// Set a candidate's review status, returning the updated record.
    async fn set_candidate_status(
        &self,
        id: Id,
        status: CandidateStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Candidate>>;
}

/// The append-only ballot ledger.
#[rocket::async_trait]
pub trait BallotLedger: Send + Sync {
    async fn has_voted(&self, election_id: Id, identity_id: Id) -> StoreResult<bool>;

    /// Append a ballot. The uniqueness check and the write are one atomic
    /// step: of any number of concurrent inserts for the same
    /// (election, identity) pair, exactly one succeeds and the rest fail with
    /// [`StoreError::Duplicate`].
    async fn insert_ballot(&self, ballot: NewBallot) -> StoreResult<Ballot>;

    /// Ballot counts per candidate. Candidates with no ballots are absent.
    async fn tally(&self, election_id: Id) -> StoreResult<HashMap<Id, u64>>;
}

/// Durable keyed storage of enrolled face embeddings.
#[rocket::async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Create or overwrite an identity's enrolment.
    async fn save_embedding(
        &self,
        identity_id: Id,
        embedding: &Embedding,
    ) -> StoreResult<EmbeddingKey>;

    /// Load an enrolment. Missing and unreadable records both come back as
    /// `None`.
    async fn load_embedding(&self, reference: &EmbeddingRef) -> StoreResult<Option<Embedding>>;

    /// Remove an identity's enrolment, returning whether one existed.
    async fn delete_embedding(&self, identity_id: Id) -> StoreResult<bool>;
}

/// Decode a persisted enrolment, treating anything unreadable as absent.
pub(crate) fn decode_embedding(key: &EmbeddingKey, doc: Document) -> Option<Embedding> {
    match bson::from_document::<StoredEmbedding>(doc) {
        Ok(stored) if stored.embedding.is_well_formed() => Some(stored.embedding),
        Ok(_) => {
            warn!("Ignoring malformed face embedding {key}");
            None
        }
        Err(e) => {
            warn!("Ignoring unreadable face embedding {key}: {e}");
            None
        }
    }
}

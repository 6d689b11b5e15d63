use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mongodb::bson::{self, Document};

use crate::model::{
    ballot::{Ballot, NewBallot},
    candidate::{Candidate, CandidateStatus, NewCandidate},
    election::{Election, NewElection},
    embedding::{Embedding, EmbeddingKey, EmbeddingRef, StoredEmbedding},
    identity::{Identity, NewIdentity},
    mongodb::Id,
};

use super::{
    decode_embedding, BallotLedger, ElectionRepository, EmbeddingStore, IdentityDirectory,
    StoreError, StoreResult,
};

/// All stores held in process memory.
///
/// Every operation takes a single lock, so uniqueness checks and the writes
/// they guard cannot interleave. Embeddings are kept as BSON documents so
/// that reads go through the same decoding as the database.
#[derive(Default)]
pub struct MemoryStore {
    identities: Mutex<HashMap<Id, Identity>>,
    elections: Mutex<HashMap<Id, Election>>,
    candidates: Mutex<HashMap<Id, Candidate>>,
    ballots: Mutex<HashMap<(Id, Id), Ballot>>,
    embeddings: Mutex<HashMap<EmbeddingKey, Document>>,
}

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identity to the directory.
    pub fn insert_identity(&self, identity: NewIdentity) -> StoreResult<Identity> {
        let identity = Identity {
            id: Id::new(),
            identity,
        };
        lock(&self.identities)?.insert(identity.id, identity.clone());
        Ok(identity)
    }

    pub fn insert_election(&self, election: NewElection) -> StoreResult<Election> {
        let election = Election {
            id: Id::new(),
            election,
        };
        lock(&self.elections)?.insert(election.id, election.clone());
        Ok(election)
    }

    /// Add a candidate record as-is, whatever its review status.
    pub fn seed_candidate(&self, candidate: NewCandidate) -> StoreResult<Candidate> {
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        lock(&self.candidates)?.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    /// Write a raw enrolment document, bypassing encoding.
    pub fn insert_raw_embedding(&self, key: EmbeddingKey, doc: Document) -> StoreResult<()> {
        lock(&self.embeddings)?.insert(key, doc);
        Ok(())
    }

    pub fn ballot_count(&self) -> StoreResult<usize> {
        Ok(lock(&self.ballots)?.len())
    }

    pub fn candidate_count(&self) -> StoreResult<usize> {
        Ok(lock(&self.candidates)?.len())
    }
}

#[rocket::async_trait]
impl IdentityDirectory for MemoryStore {
    async fn find_identity(&self, id: Id) -> StoreResult<Option<Identity>> {
        Ok(lock(&self.identities)?.get(&id).cloned())
    }

    async fn link_embedding(&self, id: Id, key: Option<EmbeddingKey>) -> StoreResult<()> {
        if let Some(identity) = lock(&self.identities)?.get_mut(&id) {
            identity.embedding = key;
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl ElectionRepository for MemoryStore {
    async fn find_election(&self, id: Id) -> StoreResult<Option<Election>> {
        Ok(lock(&self.elections)?.get(&id).cloned())
    }

    async fn find_candidate(&self, id: Id) -> StoreResult<Option<Candidate>> {
        Ok(lock(&self.candidates)?.get(&id).cloned())
    }

    async fn find_nomination(
        &self,
        election_id: Id,
        identity_id: Id,
    ) -> StoreResult<Option<Candidate>> {
        Ok(lock(&self.candidates)?
            .values()
            .find(|c| c.election_id == election_id && c.identity_id == identity_id)
            .cloned())
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Candidate> {
        let mut candidates = lock(&self.candidates)?;
        let taken = candidates.values().any(|c| {
            c.election_id == candidate.election_id && c.identity_id == candidate.identity_id
        });
        if taken {
            return Err(StoreError::Duplicate(format!(
                "nomination of {} in election {}",
                candidate.identity_id, candidate.election_id
            )));
        }
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    async fn set_candidate_status(
        &self,
        id: Id,
        status: CandidateStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Candidate>> {
        let mut candidates = lock(&self.candidates)?;
        Ok(candidates.get_mut(&id).map(|candidate| {
            candidate.status = status;
            candidate.approved_at = (status == CandidateStatus::Approved).then_some(at);
            candidate.clone()
        }))
    }
}

#[rocket::async_trait]
impl BallotLedger for MemoryStore {
    async fn has_voted(&self, election_id: Id, identity_id: Id) -> StoreResult<bool> {
        Ok(lock(&self.ballots)?.contains_key(&(election_id, identity_id)))
    }

    async fn insert_ballot(&self, ballot: NewBallot) -> StoreResult<Ballot> {
        let mut ballots = lock(&self.ballots)?;
        let key = (ballot.election_id, ballot.identity_id);
        if ballots.contains_key(&key) {
            return Err(StoreError::Duplicate(format!(
                "ballot of {} in election {}",
                ballot.identity_id, ballot.election_id
            )));
        }
        let ballot = Ballot {
            id: Id::new(),
            ballot,
        };
        ballots.insert(key, ballot.clone());
        Ok(ballot)
    }

    async fn tally(&self, election_id: Id) -> StoreResult<HashMap<Id, u64>> {
        let mut tally = HashMap::new();
        for ballot in lock(&self.ballots)?.values() {
            if ballot.election_id == election_id {
                *tally.entry(ballot.candidate_id).or_insert(0) += 1;
            }
        }
        Ok(tally)
    }
}

#[rocket::async_trait]
impl EmbeddingStore for MemoryStore {
    async fn save_embedding(
        &self,
        identity_id: Id,
        embedding: &Embedding,
    ) -> StoreResult<EmbeddingKey> {
        let stored = StoredEmbedding::new(identity_id, embedding.clone());
        let doc = bson::to_document(&stored)
            .map_err(|e| StoreError::Unavailable(format!("cannot encode embedding: {e}")))?;
        lock(&self.embeddings)?.insert(stored.key.clone(), doc);
        Ok(stored.key)
    }

    async fn load_embedding(&self, reference: &EmbeddingRef) -> StoreResult<Option<Embedding>> {
        let key = reference.key();
        let doc = lock(&self.embeddings)?.get(&key).cloned();
        Ok(doc.and_then(|doc| decode_embedding(&key, doc)))
    }

    async fn delete_embedding(&self, identity_id: Id) -> StoreResult<bool> {
        let key = EmbeddingKey::for_identity(identity_id);
        Ok(lock(&self.embeddings)?.remove(&key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use crate::model::{ballot::BallotCore, candidate::CandidateCore, election::ElectionCore};

    use super::*;

    fn embedding(values: &[f64]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    #[rocket::async_test]
    async fn second_ballot_for_the_same_voter_is_a_duplicate() {
        let store = MemoryStore::new();
        let (election, voter) = (Id::new(), Id::new());

        store
            .insert_ballot(BallotCore::new(election, Id::new(), voter))
            .await
            .unwrap();
        let second = store
            .insert_ballot(BallotCore::new(election, Id::new(), voter))
            .await;
        assert!(matches!(second, Err(StoreError::Duplicate(_))));

        // Other elections are unaffected.
        store
            .insert_ballot(BallotCore::new(Id::new(), Id::new(), voter))
            .await
            .unwrap();
        assert_eq!(store.ballot_count().unwrap(), 2);
        assert!(store.has_voted(election, voter).await.unwrap());
        assert!(!store.has_voted(election, Id::new()).await.unwrap());
    }

    #[rocket::async_test]
    async fn tally_counts_only_the_requested_election() {
        let store = MemoryStore::new();
        let (election, alice, bob) = (Id::new(), Id::new(), Id::new());
        for candidate in [alice, alice, bob] {
            store
                .insert_ballot(BallotCore::new(election, candidate, Id::new()))
                .await
                .unwrap();
        }
        store
            .insert_ballot(BallotCore::new(Id::new(), alice, Id::new()))
            .await
            .unwrap();

        let tally = store.tally(election).await.unwrap();
        assert_eq!(tally.len(), 2);
        assert_eq!(tally[&alice], 2);
        assert_eq!(tally[&bob], 1);
        assert!(store.tally(Id::new()).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn one_nomination_per_identity_per_election() {
        let store = MemoryStore::new();
        let election = store
            .insert_election(ElectionCore::upcoming_example())
            .unwrap();
        let identity = Id::new();

        let first = store
            .insert_candidate(CandidateCore::nomination(election.id, identity, None))
            .await
            .unwrap();
        let again = store
            .insert_candidate(CandidateCore::nomination(election.id, identity, None))
            .await;
        assert!(matches!(again, Err(StoreError::Duplicate(_))));
        assert_eq!(
            store.find_nomination(election.id, identity).await.unwrap(),
            Some(first)
        );
    }

    #[rocket::async_test]
    async fn status_changes_stamp_approval_time() {
        let store = MemoryStore::new();
        let candidate = store
            .insert_candidate(CandidateCore::nomination(Id::new(), Id::new(), None))
            .await
            .unwrap();
        let now = Utc::now();

        let approved = store
            .set_candidate_status(candidate.id, CandidateStatus::Approved, now)
            .await
            .unwrap()
            .unwrap();
        assert!(approved.is_approved());
        assert_eq!(approved.approved_at, Some(now));

        let rejected = store
            .set_candidate_status(candidate.id, CandidateStatus::Rejected, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rejected.status, CandidateStatus::Rejected);
        assert_eq!(rejected.approved_at, None);

        assert!(store
            .set_candidate_status(Id::new(), CandidateStatus::Approved, now)
            .await
            .unwrap()
            .is_none());
    }

    #[rocket::async_test]
    async fn enrolment_overwrites_and_deletes() {
        let store = MemoryStore::new();
        let identity = Id::new();
        let reference = EmbeddingRef::Identity(identity);

        assert_eq!(store.load_embedding(&reference).await.unwrap(), None);

        let key = store
            .save_embedding(identity, &embedding(&[0.1, 0.2]))
            .await
            .unwrap();
        store
            .save_embedding(identity, &embedding(&[0.3, 0.4]))
            .await
            .unwrap();
        assert_eq!(
            store
                .load_embedding(&EmbeddingRef::Key(key))
                .await
                .unwrap(),
            Some(embedding(&[0.3, 0.4]))
        );

        assert!(store.delete_embedding(identity).await.unwrap());
        assert!(!store.delete_embedding(identity).await.unwrap());
        assert_eq!(store.load_embedding(&reference).await.unwrap(), None);
    }

    #[rocket::async_test]
    async fn corrupt_enrolments_read_as_absent() {
        let store = MemoryStore::new();
        let identity = Id::new();
        let key = EmbeddingKey::for_identity(identity);
        store
            .insert_raw_embedding(key.clone(), doc! { "_id": key.as_str(), "embedding": 42 })
            .unwrap();

        let loaded = store
            .load_embedding(&EmbeddingRef::Identity(identity))
            .await
            .unwrap();
        assert_eq!(loaded, None);
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document},
    options::{FindOneAndUpdateOptions, ReplaceOptions, ReturnDocument},
    Database,
};
use rocket::futures::TryStreamExt;

use crate::model::{
    ballot::{Ballot, NewBallot},
    candidate::{Candidate, CandidateStatus, NewCandidate},
    election::Election,
    embedding::{Embedding, EmbeddingKey, EmbeddingRef, StoredEmbedding},
    identity::Identity,
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::{
    decode_embedding, BallotLedger, ElectionRepository, EmbeddingStore, IdentityDirectory,
    StoreError, StoreResult,
};

/// All stores backed by one MongoDB database.
///
/// Uniqueness of ballots and nominations is enforced by the indexes from
/// [`crate::model::mongodb::ensure_indexes_exist`].
#[derive(Clone)]
pub struct MongoStore {
    identities: Coll<Identity>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    ballots: Coll<Ballot>,
    embeddings: Coll<StoredEmbedding>,
}

impl MongoStore {
    pub fn from_db(db: &Database) -> Self {
        Self {
            identities: Coll::from_db(db),
            elections: Coll::from_db(db),
            candidates: Coll::from_db(db),
            ballots: Coll::from_db(db),
            embeddings: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl IdentityDirectory for MongoStore {
    async fn find_identity(&self, id: Id) -> StoreResult<Option<Identity>> {
        Ok(self.identities.find_one(id.as_doc(), None).await?)
    }

    async fn link_embedding(&self, id: Id, key: Option<EmbeddingKey>) -> StoreResult<()> {
        let update = match key {
            Some(key) => doc! { "$set": { "embedding": key.as_str() } },
            None => doc! { "$unset": { "embedding": "" } },
        };
        self.identities.update_one(id.as_doc(), update, None).await?;
        Ok(())
    }
}

#[rocket::async_trait]
impl ElectionRepository for MongoStore {
    async fn find_election(&self, id: Id) -> StoreResult<Option<Election>> {
        Ok(self.elections.find_one(id.as_doc(), None).await?)
    }

    async fn find_candidate(&self, id: Id) -> StoreResult<Option<Candidate>> {
        Ok(self.candidates.find_one(id.as_doc(), None).await?)
    }

    async fn find_nomination(
        &self,
        election_id: Id,
        identity_id: Id,
    ) -> StoreResult<Option<Candidate>> {
        let filter = doc! {
            "election_id": election_id,
            "identity_id": identity_id,
        };
        Ok(self.candidates.find_one(filter, None).await?)
    }

    async fn insert_candidate(&self, candidate: NewCandidate) -> StoreResult<Candidate> {
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        match self.candidates.insert_one(&candidate, None).await {
            Ok(_) => Ok(candidate),
            Err(e) if is_duplicate_key_error(&e) => Err(StoreError::Duplicate(format!(
                "nomination of {} in election {}",
                candidate.identity_id, candidate.election_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_candidate_status(
        &self,
        id: Id,
        status: CandidateStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Candidate>> {
        let approved_at = match status {
            CandidateStatus::Approved => Bson::DateTime(BsonDateTime::from_chrono(at)),
            CandidateStatus::Pending | CandidateStatus::Rejected => Bson::Null,
        };
        let update = doc! {
            "$set": {
                "status": status,
                "approved_at": approved_at,
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .candidates
            .find_one_and_update(id.as_doc(), update, options)
            .await?)
    }
}

#[rocket::async_trait]
impl BallotLedger for MongoStore {
    async fn has_voted(&self, election_id: Id, identity_id: Id) -> StoreResult<bool> {
        let filter = doc! {
            "election_id": election_id,
            "identity_id": identity_id,
        };
        let count = self.ballots.count_documents(filter, None).await?;
        Ok(count > 0)
    }

    async fn insert_ballot(&self, ballot: NewBallot) -> StoreResult<Ballot> {
        let ballot = Ballot {
            id: Id::new(),
            ballot,
        };
        // The unique index makes the check and the write a single operation.
        match self.ballots.insert_one(&ballot, None).await {
            Ok(_) => Ok(ballot),
            Err(e) if is_duplicate_key_error(&e) => Err(StoreError::Duplicate(format!(
                "ballot of {} in election {}",
                ballot.identity_id, ballot.election_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn tally(&self, election_id: Id) -> StoreResult<HashMap<Id, u64>> {
        let pipeline = vec![
            doc! { "$match": { "election_id": election_id } },
            doc! { "$group": { "_id": "$candidate_id", "count": { "$sum": 1 } } },
        ];
        let mut rows = self.ballots.aggregate(pipeline, None).await?;

        let mut tally = HashMap::new();
        while let Some(row) = rows.try_next().await? {
            match tally_row(&row) {
                Some((candidate_id, count)) => {
                    tally.insert(candidate_id, count);
                }
                None => warn!("Skipping unreadable tally row in election {election_id}: {row}"),
            }
        }
        Ok(tally)
    }
}

/// Read one `$group` output row. The server reports counts as either 32 or
/// 64 bit integers depending on their size.
fn tally_row(row: &Document) -> Option<(Id, u64)> {
    let candidate_id = row.get_object_id("_id").ok()?;
    let count = match row.get("count")? {
        Bson::Int32(n) => u64::try_from(*n).ok()?,
        Bson::Int64(n) => u64::try_from(*n).ok()?,
        _ => return None,
    };
    Some((candidate_id.into(), count))
}

#[rocket::async_trait]
impl EmbeddingStore for MongoStore {
    async fn save_embedding(
        &self,
        identity_id: Id,
        embedding: &Embedding,
    ) -> StoreResult<EmbeddingKey> {
        let stored = StoredEmbedding::new(identity_id, embedding.clone());
        let options = ReplaceOptions::builder().upsert(true).build();
        self.embeddings
            .replace_one(doc! { "_id": stored.key.as_str() }, &stored, options)
            .await?;
        Ok(stored.key)
    }

    async fn load_embedding(&self, reference: &EmbeddingRef) -> StoreResult<Option<Embedding>> {
        let key = reference.key();
        // Read untyped so that a corrupt record reads as absent rather than
        // as a storage fault.
        let doc = self
            .embeddings
            .raw()
            .find_one(doc! { "_id": key.as_str() }, None)
            .await?;
        Ok(doc.and_then(|doc| decode_embedding(&key, doc)))
    }

    async fn delete_embedding(&self, identity_id: Id) -> StoreResult<bool> {
        let key = EmbeddingKey::for_identity(identity_id);
        let result = self
            .embeddings
            .delete_one(doc! { "_id": key.as_str() }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::oid::ObjectId;

    use super::*;

    #[test]
    fn tally_rows_accept_both_integer_widths() {
        let candidate = ObjectId::new();
        assert_eq!(
            tally_row(&doc! { "_id": candidate, "count": 3_i32 }),
            Some((candidate.into(), 3))
        );
        assert_eq!(
            tally_row(&doc! { "_id": candidate, "count": 5_000_000_000_i64 }),
            Some((candidate.into(), 5_000_000_000))
        );
    }

    #[test]
    fn malformed_tally_rows_are_skipped() {
        assert_eq!(tally_row(&doc! { "_id": "nope", "count": 1_i32 }), None);
        assert_eq!(
            tally_row(&doc! { "_id": ObjectId::new(), "count": -1_i32 }),
            None
        );
        assert_eq!(
            tally_row(&doc! { "_id": ObjectId::new(), "count": "1" }),
            None
        );
    }
}

use std::ops::Deref;

use mongodb::{
    bson::{doc, Document},
    error::Error as DbError,
    options::IndexOptions,
    Collection, Database, IndexModel,
};

use crate::model::{
    ballot::Ballot, candidate::Candidate, election::Election, embedding::StoredEmbedding,
    identity::Identity,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

impl<T> Coll<T> {
    /// View the same collection as untyped documents, e.g. to survive
    /// records that no longer deserialize.
    pub fn raw(&self) -> Collection<Document> {
        self.0.clone_with_type()
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Identity collection
const IDENTITIES: &str = "identities";
impl MongoCollection for Identity {
    const NAME: &'static str = IDENTITIES;
}

// Election collection
const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}

// Candidate collection
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}

// Ballot collection
const BALLOTS: &str = "ballots";
impl MongoCollection for Ballot {
    const NAME: &'static str = BALLOTS;
}

// Face embedding collection
const FACE_EMBEDDINGS: &str = "face_embeddings";
impl MongoCollection for StoredEmbedding {
    const NAME: &'static str = FACE_EMBEDDINGS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Ballot collection: one ballot per voter per election.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "identity_id": 1})
        .options(unique.clone())
        .build();
    Coll::<Ballot>::from_db(db)
        .create_index(ballot_index, None)
        .await?;

    // Tally grouping.
    let tally_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "candidate_id": 1})
        .build();
    Coll::<Ballot>::from_db(db)
        .create_index(tally_index, None)
        .await?;

    // Candidate collection: one nomination per identity per election.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "identity_id": 1})
        .options(unique)
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    Ok(())
}

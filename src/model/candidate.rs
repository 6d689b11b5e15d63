use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, to_bson, Bson};
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{optional_chrono_datetime, Id};

/// Review state of a nomination.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Approved,
    Rejected,
}

impl From<CandidateStatus> for Bson {
    fn from(status: CandidateStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

/// Core candidate data, as stored in the database.
/// Unique on `(election_id, identity_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    pub election_id: Id,
    pub identity_id: Id,
    #[serde(default)]
    pub manifesto: Option<String>,
    pub status: CandidateStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub nominated_at: DateTime<Utc>,
    #[serde(default, with = "optional_chrono_datetime")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl CandidateCore {
    /// A fresh self-nomination, awaiting review.
    pub fn nomination(election_id: Id, identity_id: Id, manifesto: Option<String>) -> Self {
        // Blank manifestos are stored as absent.
        let manifesto = manifesto
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        Self {
            election_id,
            identity_id,
            manifesto,
            status: CandidateStatus::Pending,
            nominated_at: Utc::now(),
            approved_at: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == CandidateStatus::Approved
    }
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

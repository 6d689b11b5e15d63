use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Where an election is in its lifecycle, derived from the clock and the
/// active flag rather than stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    /// Not started yet.
    Upcoming,
    /// Inside its window and active: accepting ballots.
    Ongoing,
    /// Inside its window but switched off by an administrator.
    Suspended,
    /// The window has closed.
    Completed,
}

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    pub title: String,
    /// Inclusive start of the voting window.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Exclusive end of the voting window.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    pub active: bool,
}

impl ElectionCore {
    pub fn status_at(&self, now: DateTime<Utc>) -> ElectionStatus {
        if now < self.start_time {
            ElectionStatus::Upcoming
        } else if now >= self.end_time {
            ElectionStatus::Completed
        } else if self.active {
            ElectionStatus::Ongoing
        } else {
            ElectionStatus::Suspended
        }
    }

    pub fn status(&self) -> ElectionStatus {
        self.status_at(Utc::now())
    }

    pub fn is_ongoing_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == ElectionStatus::Ongoing
    }

    /// Self-nomination is open before and during voting.
    pub fn accepts_nominations_at(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status_at(now),
            ElectionStatus::Upcoming | ElectionStatus::Ongoing
        )
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

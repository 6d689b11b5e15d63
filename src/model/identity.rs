use std::ops::{Deref, DerefMut};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

use crate::model::{embedding::EmbeddingKey, mongodb::Id};

/// What an identity is allowed to do.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A student voter. The only role that may vote or self-nominate.
    Voter,
    /// Reviews nominations.
    Admin,
    /// Institution staff account; may view but never vote.
    Institution,
}

impl Role {
    pub fn can_vote(self) -> bool {
        matches!(self, Role::Voter)
    }
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        to_bson(&role).expect("Serialisation is infallible")
    }
}

/// Core identity data. The directory owns these records; the core only ever
/// reads the role, active flag and embedding reference, and links or unlinks
/// the reference on enrolment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCore {
    pub name: String,
    pub role: Role,
    pub active: bool,
    /// Reference to the enrolled face embedding, if any.
    #[serde(default)]
    pub embedding: Option<EmbeddingKey>,
}

impl IdentityCore {
    /// Is this identity allowed to vote right now?
    pub fn is_eligible_voter(&self) -> bool {
        self.role.can_vote() && self.active
    }
}

/// An identity without an ID.
pub type NewIdentity = IdentityCore;

/// An identity from the directory, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub identity: IdentityCore,
}

impl Deref for Identity {
    type Target = IdentityCore;

    fn deref(&self) -> &Self::Target {
        &self.identity
    }
}

impl DerefMut for Identity {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.identity
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl IdentityCore {
        pub fn voter_example() -> Self {
            Self {
                name: "Ada Okafor".to_string(),
                role: Role::Voter,
                active: true,
                embedding: None,
            }
        }

        pub fn admin_example() -> Self {
            Self {
                name: "Registrar".to_string(),
                role: Role::Admin,
                active: true,
                embedding: None,
            }
        }
    }
}

//! Shared test setup: the ballot gate over in-memory stores and the
//! colour-coded face backend, plus seeding helpers.

use std::sync::Arc;

use rocket::{http::Header, Build, Rocket};

use crate::biometrics::{
    testing::{face_payload, ColourCodedBackend},
    Biometrics,
};
use crate::gate::BallotGate;
use crate::model::{
    auth::AuthToken,
    candidate::{Candidate, CandidateCore, CandidateStatus},
    election::{Election, NewElection},
    identity::{Identity, IdentityCore},
};
use crate::store::{IdentityDirectory, MemoryStore};
use crate::Config;

/// The face every enrolled test voter shows unless a test says otherwise.
pub const VOTER_FACE: u8 = 20;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub config: Config,
    pub gate: BallotGate,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = Config::example();
        let biometrics = Biometrics::new(
            Arc::new(ColourCodedBackend),
            store.clone(),
            config.face(),
        );
        let gate = BallotGate::new(store.clone(), store.clone(), store.clone(), biometrics);
        Self {
            store,
            config,
            gate,
        }
    }

    /// A server sharing this fixture's stores.
    pub fn rocket(&self) -> Rocket<Build> {
        crate::rocket_for_gate(rocket::build(), self.config.clone(), self.gate.clone())
    }

    pub fn voter(&self) -> Identity {
        self.store
            .insert_identity(IdentityCore::voter_example())
            .unwrap()
    }

    pub fn admin(&self) -> Identity {
        self.store
            .insert_identity(IdentityCore::admin_example())
            .unwrap()
    }

    /// A voter who has registered the given face.
    pub async fn enrolled_voter(&self, face: u8) -> Identity {
        let voter = self.voter();
        self.gate
            .register_face(voter.id, Some(&face_payload(face)))
            .await
            .unwrap();
        self.store.find_identity(voter.id).await.unwrap().unwrap()
    }

    pub fn election(&self, election: NewElection) -> Election {
        self.store.insert_election(election).unwrap()
    }

    /// A candidate in the election with the given review status, nominated
    /// by a fresh voter.
    pub fn candidate(&self, election: &Election, status: CandidateStatus) -> Candidate {
        let nominee = self.voter();
        let mut candidate = CandidateCore::nomination(
            election.id,
            nominee.id,
            Some("Longer library hours".to_string()),
        );
        candidate.status = status;
        if status == CandidateStatus::Approved {
            candidate.approved_at = Some(candidate.nominated_at);
        }
        self.store.seed_candidate(candidate).unwrap()
    }

    /// Bearer authentication for the identity.
    pub fn auth_header(&self, identity: &Identity) -> Header<'static> {
        let token = AuthToken::issue(identity.id, &self.config).unwrap();
        Header::new("Authorization", format!("Bearer {token}"))
    }
}

//! The ballot gate: every way a caller can affect an election goes through
//! here, with the checks applied in a fixed order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::biometrics::{Biometrics, RawFrame, Verification};
use crate::error::{Error, Result};
use crate::model::{
    ballot::{Ballot, BallotCore},
    candidate::{Candidate, CandidateCore, CandidateStatus},
    election::Election,
    embedding::{EmbeddingKey, EmbeddingRef},
    identity::{Identity, Role},
    mongodb::Id,
};
use crate::store::{BallotLedger, ElectionRepository, IdentityDirectory, StoreError};

/// A ballot as submitted. IDs arrive unparsed so that malformed input is
/// reported at its place in the check order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BallotRequest {
    pub election_id: Option<String>,
    pub candidate_id: Option<String>,
    /// Base64 face image, optionally as a data URL.
    pub image: Option<String>,
}

/// Result of a self-nomination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NominationOutcome {
    Submitted(Candidate),
    /// The caller was already nominated; nothing changed.
    AlreadyNominated(Candidate),
}

impl NominationOutcome {
    pub fn candidate(&self) -> &Candidate {
        match self {
            NominationOutcome::Submitted(candidate)
            | NominationOutcome::AlreadyNominated(candidate) => candidate,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, NominationOutcome::Submitted(_))
    }
}

/// Guards ballot casting, nomination and face enrolment.
#[derive(Clone)]
pub struct BallotGate {
    identities: Arc<dyn IdentityDirectory>,
    elections: Arc<dyn ElectionRepository>,
    ledger: Arc<dyn BallotLedger>,
    biometrics: Biometrics,
}

impl BallotGate {
    pub fn new(
        identities: Arc<dyn IdentityDirectory>,
        elections: Arc<dyn ElectionRepository>,
        ledger: Arc<dyn BallotLedger>,
        biometrics: Biometrics,
    ) -> Self {
        Self {
            identities,
            elections,
            ledger,
            biometrics,
        }
    }

    pub fn biometrics(&self) -> &Biometrics {
        &self.biometrics
    }

    /// Look up the authenticated caller. A valid token for an identity the
    /// directory no longer knows is treated as unauthenticated.
    async fn caller(&self, id: Id) -> Result<Identity> {
        self.identities
            .find_identity(id)
            .await?
            .ok_or_else(|| Error::Unauthorized(format!("unknown identity {id}")))
    }

    async fn eligible_voter(&self, id: Id) -> Result<Identity> {
        let identity = self.caller(id).await?;
        if !identity.is_eligible_voter() {
            return Err(Error::NotEligible(format!(
                "identity {id} is not an active voter"
            )));
        }
        Ok(identity)
    }

    /// Enrol the caller's face from an image, replacing any earlier enrolment.
    pub async fn register_face(&self, caller: Id, image: Option<&str>) -> Result<EmbeddingKey> {
        self.eligible_voter(caller).await?;
        let frame = frame_from(image)?;
        let key = self.biometrics.enrol(caller, frame).await?;
        self.identities
            .link_embedding(caller, Some(key.clone()))
            .await?;
        info!("Registered face for identity {caller}");
        Ok(key)
    }

    /// Check an image against the caller's enrolment without casting
    /// anything.
    pub async fn verify_face(&self, caller: Id, image: Option<&str>) -> Result<Verification> {
        let identity = self.eligible_voter(caller).await?;
        let reference = enrolment_of(&identity)?;
        let frame = frame_from(image)?;
        self.biometrics.verify(caller, &reference, frame).await
    }

    /// Remove the caller's enrolment. Returns whether there was one.
    pub async fn remove_face(&self, caller: Id) -> Result<bool> {
        self.caller(caller).await?;
        let removed = self.biometrics.remove(caller).await?;
        self.identities.link_embedding(caller, None).await?;
        info!("Removed face enrolment for identity {caller} (existed: {removed})");
        Ok(removed)
    }

    /// Cast a ballot.
    ///
    /// Checks run in this order and the first failure is reported:
    ///
    /// 1. the caller is an active voter,
    /// 2. the caller has enrolled a face,
    /// 3. both IDs are present and well formed,
    /// 4. the election is ongoing,
    /// 5. the candidate is approved and belongs to the election,
    /// 6. the caller has not voted in the election,
    /// 7. the image yields exactly one face,
    /// 8. that face matches the enrolment.
    ///
    /// The ballot is then written with an atomic uniqueness check, so of any
    /// number of concurrent attempts by one voter exactly one is recorded.
    pub async fn cast_vote(&self, caller: Id, request: BallotRequest) -> Result<Ballot> {
        let voter = self.eligible_voter(caller).await?;
        let reference = enrolment_of(&voter)?;

        let election_id = parse_id("election_id", request.election_id.as_deref())?;
        let candidate_id = parse_id("candidate_id", request.candidate_id.as_deref())?;

        let now = Utc::now();
        let election = self
            .elections
            .find_election(election_id)
            .await?
            .filter(|election| election.is_ongoing_at(now))
            .ok_or(Error::ElectionNotActive(election_id))?;

        self.elections
            .find_candidate(candidate_id)
            .await?
            .filter(|candidate| candidate.election_id == election.id && candidate.is_approved())
            .ok_or(Error::CandidateNotApproved(candidate_id))?;

        let already_voted = Error::AlreadyVoted {
            election: election_id,
            identity: caller,
        };
        if self.ledger.has_voted(election_id, caller).await? {
            return Err(already_voted);
        }
        debug!("Identity {caller} cleared ballot checks for election {election_id}, verifying face");

        let frame = frame_from(request.image.as_deref())?;
        let verification = self.biometrics.verify(caller, &reference, frame).await?;
        if !verification.is_match {
            warn!(
                "Face mismatch for identity {caller} voting in election {election_id} (distance {:?})",
                verification.distance
            );
            return Err(Error::FaceMismatch {
                distance: verification.distance,
            });
        }

        let ballot = BallotCore::new(election_id, candidate_id, caller);
        match self.ledger.insert_ballot(ballot).await {
            Ok(ballot) => {
                info!(
                    "Ballot {} cast by identity {caller} in election {election_id}",
                    ballot.id
                );
                Ok(ballot)
            }
            Err(StoreError::Duplicate(_)) => {
                warn!("Rejected concurrent second ballot by identity {caller} in election {election_id}");
                Err(already_voted)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Has the caller voted in the election?
    pub async fn has_voted(&self, caller: Id, election_id: Id) -> Result<bool> {
        self.caller(caller).await?;
        self.existing_election(election_id).await?;
        Ok(self.ledger.has_voted(election_id, caller).await?)
    }

    /// Nominate the caller as a candidate. Nominations open when an election
    /// is announced and close when voting ends.
    pub async fn nominate(
        &self,
        caller: Id,
        election_id: Id,
        manifesto: Option<String>,
    ) -> Result<NominationOutcome> {
        self.eligible_voter(caller).await?;
        let election = self.existing_election(election_id).await?;
        if !election.accepts_nominations_at(Utc::now()) {
            return Err(Error::ElectionClosed(election_id));
        }

        if let Some(existing) = self.elections.find_nomination(election_id, caller).await? {
            return Ok(NominationOutcome::AlreadyNominated(existing));
        }
        let nomination = CandidateCore::nomination(election_id, caller, manifesto);
        match self.elections.insert_candidate(nomination).await {
            Ok(candidate) => {
                info!(
                    "Identity {caller} nominated in election {election_id} as candidate {}",
                    candidate.id
                );
                Ok(NominationOutcome::Submitted(candidate))
            }
            // Lost a race with a concurrent nomination by the same caller.
            Err(StoreError::Duplicate(_)) => self
                .elections
                .find_nomination(election_id, caller)
                .await?
                .map(NominationOutcome::AlreadyNominated)
                .ok_or_else(|| {
                    Error::StorageUnavailable("nomination vanished after conflict".to_string())
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// Approve or reject a pending nomination. Administrators only.
    pub async fn review_nomination(
        &self,
        caller: Id,
        candidate_id: Id,
        decision: CandidateStatus,
    ) -> Result<Candidate> {
        let reviewer = self.caller(caller).await?;
        if !(reviewer.role == Role::Admin && reviewer.active) {
            return Err(Error::NotEligible(format!(
                "identity {caller} may not review nominations"
            )));
        }
        if decision == CandidateStatus::Pending {
            return Err(Error::Input(
                "a review must approve or reject".to_string(),
            ));
        }

        let candidate = self
            .elections
            .set_candidate_status(candidate_id, decision, Utc::now())
            .await?
            .ok_or_else(|| Error::not_found(format!("candidate {candidate_id}")))?;
        info!("Candidate {candidate_id} marked {decision:?} by {caller}");
        Ok(candidate)
    }

    /// Ballot counts for every candidate that received at least one.
    pub async fn tally(&self, election_id: Id) -> Result<HashMap<Id, u64>> {
        self.existing_election(election_id).await?;
        Ok(self.ledger.tally(election_id).await?)
    }

    async fn existing_election(&self, election_id: Id) -> Result<Election> {
        self.elections
            .find_election(election_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("election {election_id}")))
    }
}

fn enrolment_of(identity: &Identity) -> Result<EmbeddingRef> {
    identity
        .embedding
        .clone()
        .map(EmbeddingRef::Key)
        .ok_or(Error::NotRegistered(identity.id))
}

fn frame_from(image: Option<&str>) -> Result<RawFrame> {
    match image {
        Some(payload) => RawFrame::from_payload(payload),
        None => Err(Error::Input("no image provided".to_string())),
    }
}

fn parse_id(field: &str, value: Option<&str>) -> Result<Id> {
    let value = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::Input(format!("`{field}` is required")))?;
    value
        .parse()
        .map_err(|_| Error::Input(format!("`{field}` is not a valid ID")))
}

use chrono::{DateTime, Utc};
use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gate::BallotGate;
use crate::model::{
    auth::AuthToken,
    candidate::{Candidate, CandidateStatus},
    mongodb::Id,
};

pub fn routes() -> Vec<Route> {
    routes![nominate, review_nomination]
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NominationRequest {
    #[serde(default)]
    pub manifesto: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CandidateView {
    pub candidate_id: String,
    pub election_id: String,
    pub identity_id: String,
    pub status: CandidateStatus,
    pub manifesto: Option<String>,
    pub nominated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl From<&Candidate> for CandidateView {
    fn from(candidate: &Candidate) -> Self {
        Self {
            candidate_id: candidate.id.to_string(),
            election_id: candidate.election_id.to_string(),
            identity_id: candidate.identity_id.to_string(),
            status: candidate.status,
            manifesto: candidate.manifesto.clone(),
            nominated_at: candidate.nominated_at,
            approved_at: candidate.approved_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NominationResponse {
    #[serde(flatten)]
    pub candidate: CandidateView,
    /// Set when the caller had already been nominated and nothing changed.
    pub already_nominated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub status: CandidateStatus,
}

#[post("/elections/<election_id>/nominations", data = "<request>", format = "json")]
async fn nominate(
    token: AuthToken,
    election_id: Id,
    request: Json<NominationRequest>,
    gate: &State<BallotGate>,
) -> Result<Json<NominationResponse>> {
    let outcome = gate
        .nominate(token.id(), election_id, request.into_inner().manifesto)
        .await?;
    Ok(Json(NominationResponse {
        candidate: outcome.candidate().into(),
        already_nominated: !outcome.is_new(),
    }))
}

#[put("/candidates/<candidate_id>/status", data = "<review>", format = "json")]
async fn review_nomination(
    token: AuthToken,
    candidate_id: Id,
    review: Json<ReviewRequest>,
    gate: &State<BallotGate>,
) -> Result<Json<CandidateView>> {
    let candidate = gate
        .review_nomination(token.id(), candidate_id, review.status)
        .await?;
    Ok(Json((&candidate).into()))
}

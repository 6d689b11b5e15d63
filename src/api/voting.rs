use chrono::{DateTime, Utc};
use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gate::{BallotGate, BallotRequest};
use crate::model::{auth::AuthToken, ballot::Ballot, mongodb::Id};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, has_voted]
}

/// What a voter gets back for a recorded ballot.
#[derive(Debug, Serialize, Deserialize)]
pub struct BallotReceipt {
    pub ballot_id: String,
    pub election_id: String,
    pub candidate_id: String,
    pub cast_at: DateTime<Utc>,
}

impl From<Ballot> for BallotReceipt {
    fn from(ballot: Ballot) -> Self {
        Self {
            ballot_id: ballot.id.to_string(),
            election_id: ballot.election_id.to_string(),
            candidate_id: ballot.candidate_id.to_string(),
            cast_at: ballot.cast_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VotedStatus {
    pub voted: bool,
}

#[post("/votes", data = "<request>", format = "json")]
async fn cast_vote(
    token: AuthToken,
    request: Json<BallotRequest>,
    gate: &State<BallotGate>,
) -> Result<Json<BallotReceipt>> {
    let ballot = gate.cast_vote(token.id(), request.into_inner()).await?;
    Ok(Json(ballot.into()))
}

#[get("/elections/<election_id>/voted")]
async fn has_voted(
    token: AuthToken,
    election_id: Id,
    gate: &State<BallotGate>,
) -> Result<Json<VotedStatus>> {
    let voted = gate.has_voted(token.id(), election_id).await?;
    Ok(Json(VotedStatus { voted }))
}

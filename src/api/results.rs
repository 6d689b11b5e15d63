use std::collections::HashMap;

use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gate::BallotGate;
use crate::model::{auth::AuthToken, mongodb::Id};

pub fn routes() -> Vec<Route> {
    routes![tally]
}

/// Ballot counts keyed by candidate ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Tally {
    pub election_id: String,
    pub counts: HashMap<String, u64>,
    pub total: u64,
}

#[get("/elections/<election_id>/tally")]
async fn tally(
    _token: AuthToken,
    election_id: Id,
    gate: &State<BallotGate>,
) -> Result<Json<Tally>> {
    let counts = gate.tally(election_id).await?;
    let total = counts.values().sum();
    let counts = counts
        .into_iter()
        .map(|(candidate_id, count)| (candidate_id.to_string(), count))
        .collect();
    Ok(Json(Tally {
        election_id: election_id.to_string(),
        counts,
        total,
    }))
}

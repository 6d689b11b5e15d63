use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::biometrics::Verification;
use crate::error::Result;
use crate::gate::BallotGate;
use crate::model::auth::AuthToken;

pub fn routes() -> Vec<Route> {
    routes![register_face, verify_face, remove_face]
}

/// A face image upload: base64, optionally as a `data:` URL.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FaceImage {
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaceRegistration {
    pub registered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaceRemoval {
    pub removed: bool,
}

#[put("/face", data = "<upload>", format = "json")]
async fn register_face(
    token: AuthToken,
    upload: Json<FaceImage>,
    gate: &State<BallotGate>,
) -> Result<Json<FaceRegistration>> {
    gate.register_face(token.id(), upload.image.as_deref()).await?;
    Ok(Json(FaceRegistration { registered: true }))
}

#[post("/face/verify", data = "<upload>", format = "json")]
async fn verify_face(
    token: AuthToken,
    upload: Json<FaceImage>,
    gate: &State<BallotGate>,
) -> Result<Json<Verification>> {
    let verification = gate.verify_face(token.id(), upload.image.as_deref()).await?;
    Ok(Json(verification))
}

#[delete("/face")]
async fn remove_face(token: AuthToken, gate: &State<BallotGate>) -> Result<Json<FaceRemoval>> {
    let removed = gate.remove_face(token.id()).await?;
    Ok(Json(FaceRemoval { removed }))
}

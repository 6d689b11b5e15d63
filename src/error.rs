use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::model::mongodb::Id;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while registering, verifying, voting or
/// nominating. None of these are fatal to the server.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Bad request: {0}")]
    Input(String),
    #[error("No face detected. Try moving closer, ensure good lighting, and face the camera directly.")]
    NoFaceDetected,
    #[error("Multiple faces detected ({0}). Ensure only you are in the frame.")]
    MultipleFacesDetected(usize),
    #[error("Could not extract a face embedding, please try again with a new image: {0}")]
    ExtractionFailed(String),
    #[error("No face registered for identity {0}")]
    NotRegistered(Id),
    #[error("Face verification failed")]
    FaceMismatch { distance: Option<f64> },
    #[error("Not permitted: {0}")]
    NotEligible(String),
    #[error("Election {0} is not accepting ballots")]
    ElectionNotActive(Id),
    #[error("Candidate {0} is not an approved candidate in this election")]
    CandidateNotApproved(Id),
    #[error("Identity {identity} has already voted in election {election}")]
    AlreadyVoted { election: Id, identity: Id },
    #[error("Election {0} is closed for nominations")]
    ElectionClosed(Id),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "input_error",
            Self::NoFaceDetected => "no_face_detected",
            Self::MultipleFacesDetected(_) => "multiple_faces_detected",
            Self::ExtractionFailed(_) => "extraction_failed",
            Self::NotRegistered(_) => "not_registered",
            Self::FaceMismatch { .. } => "face_mismatch",
            Self::NotEligible(_) => "not_eligible",
            Self::ElectionNotActive(_) => "election_not_active",
            Self::CandidateNotApproved(_) => "candidate_not_approved",
            Self::AlreadyVoted { .. } => "already_voted",
            Self::ElectionClosed(_) => "election_closed",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Input(_) | Self::NotRegistered(_) | Self::CandidateNotApproved(_) => {
                Status::BadRequest
            }
            Self::NoFaceDetected | Self::MultipleFacesDetected(_) | Self::ExtractionFailed(_) => {
                Status::UnprocessableEntity
            }
            Self::FaceMismatch { .. } | Self::NotEligible(_) => Status::Forbidden,
            Self::ElectionNotActive(_) | Self::AlreadyVoted { .. } | Self::ElectionClosed(_) => {
                Status::Conflict
            }
            Self::NotFound(_) => Status::NotFound,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::StorageUnavailable(_) => Status::ServiceUnavailable,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => Self::Input(format!("duplicate {what}")),
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

/// JSON body sent alongside every error status.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.class() == StatusClass::ServerError {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).respond_to(req)
    }
}

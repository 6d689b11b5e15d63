use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FaceConfig;

/// Length of the descriptors produced by the dlib ResNet encoder.
pub const FACE_EMBEDDING_DIMENSION: usize = 128;

/// Pixel rectangle around a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("face backend unavailable: {0}")]
    Unavailable(String),
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("embedding extraction failed: {0}")]
    Extraction(String),
}

/// A face detector and embedding extractor.
///
/// Calls are blocking and CPU-heavy; callers run them off the async executor.
pub trait FaceBackend: Send + Sync {
    /// Length of every embedding this backend produces.
    fn dimension(&self) -> usize;

    /// Locate every face in the image.
    fn detect_faces(&self, image: &RgbImage, upsample: u32)
        -> Result<Vec<BoundingBox>, BackendError>;

    /// Compute the embedding of one located face.
    fn extract_embedding(
        &self,
        image: &RgbImage,
        face: &BoundingBox,
        jitters: u32,
    ) -> Result<Vec<f64>, BackendError>;
}

/// Stands in when no real backend could be loaded. Every call fails, so face
/// registration and voting are refused while the rest of the server works.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl FaceBackend for UnavailableBackend {
    fn dimension(&self) -> usize {
        FACE_EMBEDDING_DIMENSION
    }

    fn detect_faces(
        &self,
        _image: &RgbImage,
        _upsample: u32,
    ) -> Result<Vec<BoundingBox>, BackendError> {
        Err(BackendError::Unavailable(self.reason.clone()))
    }

    fn extract_embedding(
        &self,
        _image: &RgbImage,
        _face: &BoundingBox,
        _jitters: u32,
    ) -> Result<Vec<f64>, BackendError> {
        Err(BackendError::Unavailable(self.reason.clone()))
    }
}

/// Load the configured face backend, falling back to [`UnavailableBackend`].
pub fn backend_from_config(config: &FaceConfig) -> Arc<dyn FaceBackend> {
    #[cfg(feature = "dlib")]
    {
        match (&config.landmark_model, &config.encoder_model) {
            (Some(landmark), Some(encoder)) => {
                match super::dlib::DlibBackend::open(landmark, encoder) {
                    Ok(backend) => {
                        info!("Loaded dlib face models");
                        return Arc::new(backend);
                    }
                    Err(e) => {
                        error!("Failed to load dlib face models: {e}");
                        return Arc::new(UnavailableBackend::new(e.to_string()));
                    }
                }
            }
            _ => warn!("`face.landmark_model` and `face.encoder_model` must both be set"),
        }
    }
    #[cfg(not(feature = "dlib"))]
    {
        if config.landmark_model.is_some() || config.encoder_model.is_some() {
            warn!("Face models are configured but the `dlib` feature is not enabled");
        }
    }

    warn!("No face backend available, face registration and voting will be refused");
    Arc::new(UnavailableBackend::new("no face models loaded"))
}

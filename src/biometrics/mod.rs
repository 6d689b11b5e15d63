//! The face pipeline: normalise a frame, locate exactly one face, extract its
//! embedding, and compare it against an enrolment.

use std::sync::Arc;

use rocket::tokio::task;

use crate::config::FaceConfig;
use crate::error::{Error, Result};
use crate::model::{
    embedding::{Embedding, EmbeddingKey, EmbeddingRef},
    mongodb::Id,
};
use crate::store::EmbeddingStore;

mod backend;
#[cfg(feature = "dlib")]
mod dlib;
mod frame;
mod matcher;
mod normalize;
#[cfg(test)]
pub mod testing;

pub use backend::{
    backend_from_config, BackendError, BoundingBox, FaceBackend, UnavailableBackend,
    FACE_EMBEDDING_DIMENSION,
};
#[cfg(feature = "dlib")]
pub use dlib::DlibBackend;
pub use frame::{PixelLayout, RawFrame};
pub use matcher::{euclidean_distance, Matcher, Verification, DEFAULT_MATCH_THRESHOLD};
pub use normalize::Normalizer;

/// Tuning passed through to the backend on every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExtractionParams {
    upsample: u32,
    jitters: u32,
}

/// Face enrolment and verification over a backend and an embedding store.
#[derive(Clone)]
pub struct Biometrics {
    backend: Arc<dyn FaceBackend>,
    store: Arc<dyn EmbeddingStore>,
    normalizer: Normalizer,
    matcher: Matcher,
    params: ExtractionParams,
}

impl Biometrics {
    pub fn new(
        backend: Arc<dyn FaceBackend>,
        store: Arc<dyn EmbeddingStore>,
        config: &FaceConfig,
    ) -> Self {
        Self {
            backend,
            store,
            normalizer: Normalizer::new(config.max_image_dim, config.min_image_dim),
            matcher: Matcher::new(config.match_threshold),
            params: ExtractionParams {
                upsample: config.detection_upsample,
                jitters: config.encoding_jitters,
            },
        }
    }

    /// Turn a frame into the embedding of the single face it shows.
    ///
    /// Runs on the blocking pool; a panic inside the backend becomes
    /// [`Error::ExtractionFailed`].
    pub async fn embed(&self, frame: RawFrame) -> Result<Embedding> {
        let backend = self.backend.clone();
        let normalizer = self.normalizer;
        let params = self.params;
        task::spawn_blocking(move || extract_single_face(&*backend, &normalizer, params, frame))
            .await
            .unwrap_or_else(|e| {
                error!("Face backend task failed: {e}");
                Err(Error::ExtractionFailed("face backend crashed".to_string()))
            })
    }

    /// Extract a face from the frame and store it as the identity's
    /// enrolment, replacing any previous one.
    pub async fn enrol(&self, identity_id: Id, frame: RawFrame) -> Result<EmbeddingKey> {
        let embedding = self.embed(frame).await?;
        let key = self.store.save_embedding(identity_id, &embedding).await?;
        Ok(key)
    }

    /// Load an enrolment that this backend can compare against.
    ///
    /// Enrolments of the wrong length were made by another extractor and are
    /// as good as missing.
    pub async fn enrolment(&self, reference: &EmbeddingRef) -> Result<Option<Embedding>> {
        let stored = self.store.load_embedding(reference).await?;
        Ok(stored.filter(|embedding| {
            let compatible = embedding.dimension() == self.backend.dimension();
            if !compatible {
                warn!(
                    "Ignoring face embedding {} of length {}, expected {}",
                    reference.key(),
                    embedding.dimension(),
                    self.backend.dimension()
                );
            }
            compatible
        }))
    }

    /// Compare a live frame against an enrolment.
    ///
    /// The enrolment is loaded before any extraction work, so unregistered
    /// callers are turned away cheaply.
    pub async fn verify(
        &self,
        identity_id: Id,
        reference: &EmbeddingRef,
        frame: RawFrame,
    ) -> Result<Verification> {
        let enrolled = self
            .enrolment(reference)
            .await?
            .ok_or(Error::NotRegistered(identity_id))?;
        let live = self.embed(frame).await?;
        let verification = self.matcher.verify(Some(&live), Some(&enrolled));
        debug!(
            "Face comparison for {identity_id}: distance {:?}, match {}",
            verification.distance, verification.is_match
        );
        Ok(verification)
    }

    /// Delete an identity's enrolment, returning whether there was one.
    pub async fn remove(&self, identity_id: Id) -> Result<bool> {
        Ok(self.store.delete_embedding(identity_id).await?)
    }
}

/// Normalise, then insist on exactly one face, then extract it.
fn extract_single_face(
    backend: &dyn FaceBackend,
    normalizer: &Normalizer,
    params: ExtractionParams,
    frame: RawFrame,
) -> Result<Embedding> {
    let image = normalizer.normalize(frame)?;

    let faces = backend
        .detect_faces(&image, params.upsample)
        .map_err(|e| Error::ExtractionFailed(e.to_string()))?;
    let face = match faces.as_slice() {
        [face] => face,
        [] => return Err(Error::NoFaceDetected),
        _ => return Err(Error::MultipleFacesDetected(faces.len())),
    };

    let values = backend
        .extract_embedding(&image, face, params.jitters)
        .map_err(|e| Error::ExtractionFailed(e.to_string()))?;
    if values.len() != backend.dimension() {
        return Err(Error::ExtractionFailed(format!(
            "expected {} values, got {}",
            backend.dimension(),
            values.len()
        )));
    }
    Embedding::new(values)
        .ok_or_else(|| Error::ExtractionFailed("non-finite embedding values".to_string()))
}

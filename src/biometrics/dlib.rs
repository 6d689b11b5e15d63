use std::path::Path;
use std::sync::Mutex;

use dlib_face_recognition::{
    FaceDetector, FaceDetectorTrait, FaceEncoderNetwork, FaceEncoderTrait, ImageMatrix,
    LandmarkPredictor, LandmarkPredictorTrait, Rectangle,
};
use image::{imageops, imageops::FilterType, RgbImage};

use super::backend::{BackendError, BoundingBox, FaceBackend, FACE_EMBEDDING_DIMENSION};

/// Largest side the detector is ever asked to scan after upsampling.
const MAX_UPSAMPLED_DIM: u32 = 3200;

struct Models {
    detector: FaceDetector,
    predictor: LandmarkPredictor,
    encoder: FaceEncoderNetwork,
}

/// HOG face detection, 5-point landmarks and the ResNet face encoder from
/// dlib.
pub struct DlibBackend {
    // The dlib handles are not safe to share between threads.
    models: Mutex<Models>,
}

impl DlibBackend {
    pub fn open(landmark_model: &Path, encoder_model: &Path) -> Result<Self, BackendError> {
        debug!("Loading landmark model {}", landmark_model.display());
        let predictor = LandmarkPredictor::open(landmark_model).map_err(|message| {
            BackendError::Unavailable(format!("{}: {message}", landmark_model.display()))
        })?;
        debug!("Loading encoder model {}", encoder_model.display());
        let encoder = FaceEncoderNetwork::open(encoder_model).map_err(|message| {
            BackendError::Unavailable(format!("{}: {message}", encoder_model.display()))
        })?;
        let detector = FaceDetector::new();

        Ok(Self {
            models: Mutex::new(Models {
                detector,
                predictor,
                encoder,
            }),
        })
    }

    fn models(&self) -> Result<std::sync::MutexGuard<'_, Models>, BackendError> {
        self.models
            .lock()
            .map_err(|_| BackendError::Unavailable("dlib models poisoned by a panic".to_string()))
    }
}

// The handles are only ever touched behind the mutex.
unsafe impl Send for DlibBackend {}
unsafe impl Sync for DlibBackend {}

impl FaceBackend for DlibBackend {
    fn dimension(&self) -> usize {
        FACE_EMBEDDING_DIMENSION
    }

    fn detect_faces(
        &self,
        image: &RgbImage,
        upsample: u32,
    ) -> Result<Vec<BoundingBox>, BackendError> {
        // Each upsampling pass doubles the frame, so smaller faces are found.
        let mut factor = 1u32;
        for _ in 0..upsample {
            if image.width().max(image.height()) * factor * 2 > MAX_UPSAMPLED_DIM {
                break;
            }
            factor *= 2;
        }
        let scaled;
        let scan = if factor > 1 {
            scaled = imageops::resize(
                image,
                image.width() * factor,
                image.height() * factor,
                FilterType::Triangle,
            );
            &scaled
        } else {
            image
        };

        let models = self.models()?;
        let matrix = ImageMatrix::from_image(scan);
        let locations = models.detector.face_locations(&matrix);
        let factor = i64::from(factor);
        Ok(locations
            .iter()
            .map(|rect| BoundingBox {
                left: rect.left / factor,
                top: rect.top / factor,
                right: rect.right / factor,
                bottom: rect.bottom / factor,
            })
            .collect())
    }

    fn extract_embedding(
        &self,
        image: &RgbImage,
        face: &BoundingBox,
        jitters: u32,
    ) -> Result<Vec<f64>, BackendError> {
        let models = self.models()?;
        let matrix = ImageMatrix::from_image(image);
        let rect = Rectangle {
            left: face.left,
            top: face.top,
            right: face.right,
            bottom: face.bottom,
        };
        let landmarks = models.predictor.face_landmarks(&matrix, &rect);
        let encodings = models
            .encoder
            .get_face_encodings(&matrix, &[landmarks], jitters);
        encodings
            .iter()
            .next()
            .map(|encoding| encoding.as_ref().to_vec())
            .ok_or_else(|| BackendError::Extraction("encoder returned no descriptor".to_string()))
    }
}

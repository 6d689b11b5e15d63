//! A deterministic face backend for tests, driven by the colour of the
//! centre pixel.
//!
//! * red: number of faces, in steps of 64 (`0` none, `64` one, `128` two).
//!   `255` makes detection itself fail.
//! * green: the face's identity; the embedding is `[green / 100, 0, 0, 0]`,
//!   so faces `0` and `42` are 0.42 apart.
//! * blue: `255` makes extraction fail.

use std::io::Cursor;

use data_encoding::BASE64;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

use super::backend::{BackendError, BoundingBox, FaceBackend};

pub const TEST_EMBEDDING_DIMENSION: usize = 4;

const FRAME_SIDE: u32 = 300;

#[derive(Debug, Clone, Copy, Default)]
pub struct ColourCodedBackend;

fn centre(image: &RgbImage) -> Rgb<u8> {
    *image.get_pixel(image.width() / 2, image.height() / 2)
}

impl FaceBackend for ColourCodedBackend {
    fn dimension(&self) -> usize {
        TEST_EMBEDDING_DIMENSION
    }

    fn detect_faces(
        &self,
        image: &RgbImage,
        _upsample: u32,
    ) -> Result<Vec<BoundingBox>, BackendError> {
        let Rgb([red, _, _]) = centre(image);
        if red == 255 {
            return Err(BackendError::Detection("sensor glitch".to_string()));
        }
        let faces = (i64::from(red) + 32) / 64;
        Ok((0..faces)
            .map(|i| BoundingBox {
                left: i * 50,
                top: 0,
                right: i * 50 + 40,
                bottom: 40,
            })
            .collect())
    }

    fn extract_embedding(
        &self,
        image: &RgbImage,
        _face: &BoundingBox,
        _jitters: u32,
    ) -> Result<Vec<f64>, BackendError> {
        let Rgb([_, green, blue]) = centre(image);
        if blue == 255 {
            return Err(BackendError::Extraction("blurred".to_string()));
        }
        Ok(vec![f64::from(green) / 100.0, 0.0, 0.0, 0.0])
    }
}

/// A uniformly coloured frame, PNG encoded as a data URL.
pub fn frame_payload(colour: [u8; 3]) -> String {
    let image = RgbImage::from_pixel(FRAME_SIDE, FRAME_SIDE, Rgb(colour));
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
        .unwrap();
    format!("data:image/png;base64,{}", BASE64.encode(&png))
}

/// A frame showing exactly one face with the given identity.
pub fn face_payload(face: u8) -> String {
    frame_payload([64, face, 0])
}

/// A frame showing `count` faces.
pub fn crowd_payload(count: u8) -> String {
    frame_payload([count * 64, 0, 0])
}

/// A frame in which detection breaks.
pub fn glitch_payload() -> String {
    frame_payload([255, 0, 0])
}

/// A frame with one face that cannot be encoded.
pub fn blurred_payload() -> String {
    frame_payload([64, 0, 255])
}

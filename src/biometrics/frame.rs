use data_encoding::BASE64;
use image::RgbImage;

use crate::error::{Error, Result};

/// Channel order of a raw pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Luma8,
}

impl PixelLayout {
    fn channels(self) -> usize {
        match self {
            PixelLayout::Rgb8 | PixelLayout::Bgr8 => 3,
            PixelLayout::Rgba8 | PixelLayout::Bgra8 => 4,
            PixelLayout::Luma8 => 1,
        }
    }

    fn to_rgb(self, px: &[u8]) -> [u8; 3] {
        match self {
            PixelLayout::Rgb8 | PixelLayout::Rgba8 => [px[0], px[1], px[2]],
            PixelLayout::Bgr8 | PixelLayout::Bgra8 => [px[2], px[1], px[0]],
            PixelLayout::Luma8 => [px[0], px[0], px[0]],
        }
    }
}

/// A camera frame as submitted, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// An encoded image file, e.g. PNG or JPEG.
    Encoded(Vec<u8>),
    /// Uncompressed pixels, row-major with no padding.
    Pixels {
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: Vec<u8>,
    },
}

impl RawFrame {
    /// Decode a base64 image as sent by browsers, with or without a
    /// `data:image/...;base64,` prefix.
    pub fn from_payload(payload: &str) -> Result<Self> {
        let encoded = match payload.split_once(',') {
            Some((_, data)) => data,
            None => payload,
        };
        let encoded: String = encoded
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if encoded.is_empty() {
            return Err(Error::Input("no image provided".to_string()));
        }
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| Error::Input(format!("image is not valid base64: {e}")))?;
        Ok(Self::Encoded(bytes))
    }

    /// Decode into a 3-channel RGB image.
    pub fn into_rgb(self) -> Result<RgbImage> {
        let image = match self {
            RawFrame::Encoded(bytes) => image::load_from_memory(&bytes)
                .map_err(|e| Error::Input(format!("cannot decode image: {e}")))?
                .to_rgb8(),
            RawFrame::Pixels {
                width,
                height,
                layout,
                data,
            } => {
                let expected = width as usize * height as usize * layout.channels();
                if data.len() != expected {
                    return Err(Error::Input(format!(
                        "{width}x{height} {layout:?} frame needs {expected} bytes, got {}",
                        data.len()
                    )));
                }
                let rgb = data
                    .chunks_exact(layout.channels())
                    .flat_map(|px| layout.to_rgb(px))
                    .collect();
                RgbImage::from_raw(width, height, rgb)
                    .ok_or_else(|| Error::Input("frame size overflow".to_string()))?
            }
        };
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::Input("image has no pixels".to_string()));
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_prefix_is_optional() {
        let bytes = vec![1, 2, 3, 250];
        let plain = BASE64.encode(&bytes);
        let url = format!("data:image/png;base64,{plain}");
        assert_eq!(
            RawFrame::from_payload(&plain).unwrap(),
            RawFrame::Encoded(bytes.clone())
        );
        assert_eq!(
            RawFrame::from_payload(&url).unwrap(),
            RawFrame::Encoded(bytes)
        );
    }

    #[test]
    fn empty_or_garbled_payloads_are_input_errors() {
        assert!(matches!(RawFrame::from_payload(""), Err(Error::Input(_))));
        assert!(matches!(
            RawFrame::from_payload("data:image/png;base64,"),
            Err(Error::Input(_))
        ));
        assert!(matches!(
            RawFrame::from_payload("not*base64"),
            Err(Error::Input(_))
        ));
    }

    #[test]
    fn undecodable_bytes_are_input_errors() {
        let frame = RawFrame::Encoded(b"definitely not a png".to_vec());
        assert!(matches!(frame.into_rgb(), Err(Error::Input(_))));
    }

    #[test]
    fn channel_orders_convert_to_rgb() {
        let bgra = RawFrame::Pixels {
            width: 1,
            height: 1,
            layout: PixelLayout::Bgra8,
            data: vec![10, 20, 30, 255],
        };
        assert_eq!(bgra.into_rgb().unwrap().get_pixel(0, 0).0, [30, 20, 10]);

        let luma = RawFrame::Pixels {
            width: 2,
            height: 1,
            layout: PixelLayout::Luma8,
            data: vec![7, 9],
        };
        let rgb = luma.into_rgb().unwrap();
        assert_eq!(rgb.get_pixel(1, 0).0, [9, 9, 9]);
    }

    #[test]
    fn short_pixel_buffers_are_rejected() {
        let frame = RawFrame::Pixels {
            width: 2,
            height: 2,
            layout: PixelLayout::Rgb8,
            data: vec![0; 11],
        };
        assert!(matches!(frame.into_rgb(), Err(Error::Input(_))));

        let empty = RawFrame::Pixels {
            width: 0,
            height: 0,
            layout: PixelLayout::Rgb8,
            data: vec![],
        };
        assert!(matches!(empty.into_rgb(), Err(Error::Input(_))));
    }
}

use image::{imageops, imageops::FilterType, RgbImage};

use crate::error::Result;

use super::frame::RawFrame;

/// Brings frames to a consistent, detector-friendly size.
///
/// Oversized frames are shrunk until their largest side fits `max_dim`;
/// otherwise undersized frames are enlarged towards `min_dim` on their
/// smallest side. The largest side never exceeds `max_dim`, so a very
/// elongated frame may still end up below `min_dim` on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    max_dim: u32,
    min_dim: u32,
}

impl Normalizer {
    pub fn new(max_dim: u32, min_dim: u32) -> Self {
        Self { max_dim, min_dim }
    }

    /// Decode a frame to RGB and resize it if needed.
    pub fn normalize(&self, frame: RawFrame) -> Result<RgbImage> {
        let image = frame.into_rgb()?;
        let (width, height) = match self.target_size(image.width(), image.height()) {
            Some(size) => size,
            None => return Ok(image),
        };
        debug!(
            "Resizing frame from {}x{} to {width}x{height}",
            image.width(),
            image.height()
        );
        Ok(if width.max(height) < image.width().max(image.height()) {
            // Area averaging when shrinking.
            imageops::thumbnail(&image, width, height)
        } else {
            imageops::resize(&image, width, height, FilterType::Triangle)
        })
    }

    /// The size a `width`x`height` frame should be resized to, or `None` if it
    /// is already within bounds or cannot grow without breaking `max_dim`.
    pub fn target_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let largest = width.max(height);
        let smallest = width.min(height);
        if smallest == 0 {
            return None;
        }
        let max_dim = f64::from(self.max_dim);
        let scale = if largest > self.max_dim {
            max_dim / f64::from(largest)
        } else if smallest < self.min_dim {
            let grow = f64::from(self.min_dim) / f64::from(smallest);
            grow.min(max_dim / f64::from(largest))
        } else {
            return None;
        };
        let scaled = |side: u32| {
            ((f64::from(side) * scale).round() as u32).clamp(1, self.max_dim.max(1))
        };
        let target = (scaled(width), scaled(height));
        if target == (width, height) {
            None
        } else {
            Some(target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::frame::PixelLayout;

    fn normalizer() -> Normalizer {
        Normalizer::new(800, 250)
    }

    #[test]
    fn large_frames_shrink_to_the_maximum() {
        assert_eq!(normalizer().target_size(1600, 1200), Some((800, 600)));
        assert_eq!(normalizer().target_size(600, 2400), Some((200, 800)));
    }

    #[test]
    fn small_frames_grow_to_the_minimum() {
        assert_eq!(normalizer().target_size(100, 200), Some((250, 500)));
        assert_eq!(normalizer().target_size(125, 125), Some((250, 250)));
    }

    #[test]
    fn growth_stops_at_the_maximum() {
        assert_eq!(normalizer().target_size(100, 400), Some((200, 800)));
        assert_eq!(normalizer().target_size(1, 799), Some((1, 800)));
        assert_eq!(normalizer().target_size(2, 800), None);
        for (width, height) in [(1, 799), (2, 799), (3, 640), (10, 10), (249, 801)] {
            if let Some((w, h)) = normalizer().target_size(width, height) {
                assert!(w.max(h) <= 800, "{width}x{height} grew to {w}x{h}");
            }
        }
    }

    #[test]
    fn frames_within_bounds_are_untouched() {
        assert_eq!(normalizer().target_size(640, 480), None);
        assert_eq!(normalizer().target_size(800, 250), None);
    }

    #[test]
    fn normalize_resizes_decoded_pixels() {
        let frame = RawFrame::Pixels {
            width: 100,
            height: 50,
            layout: PixelLayout::Rgb8,
            data: vec![200; 100 * 50 * 3],
        };
        let image = normalizer().normalize(frame).unwrap();
        assert_eq!(image.dimensions(), (500, 250));
    }

    #[test]
    fn elongated_slivers_stay_small() {
        let frame = RawFrame::Pixels {
            width: 2,
            height: 799,
            layout: PixelLayout::Luma8,
            data: vec![90; 2 * 799],
        };
        let image = normalizer().normalize(frame).unwrap();
        assert_eq!(image.dimensions(), (2, 800));
    }

    #[test]
    fn normalize_shrinks_large_pixels() {
        let frame = RawFrame::Pixels {
            width: 1600,
            height: 1000,
            layout: PixelLayout::Rgb8,
            data: vec![120; 1600 * 1000 * 3],
        };
        let image = normalizer().normalize(frame).unwrap();
        assert_eq!(image.dimensions(), (800, 500));
    }
}

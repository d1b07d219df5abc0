//! Built-in face detector based on skin-tone segmentation
//!
//! Pixels are classified as skin in YCbCr space, aggregated into a coarse
//! grid of cells, and connected groups of skin cells with a face-like size
//! and aspect ratio are reported as faces. Cheap enough to run on every
//! frame without any native vision runtime; crude enough that the pose
//! strategy should be preferred when a landmark estimator is available.

use super::{AnalysisFailure, FaceBox, FaceDetector};
use crate::signal::Frame;

/// Skin-tone blob detector
#[derive(Debug, Clone)]
pub struct SkinToneDetector {
    /// Cell edge in pixels
    pub cell_size: u32,
    /// Fraction of skin pixels for a cell to count as skin
    pub min_cell_fill: f64,
    /// Minimum blob area as a fraction of the frame
    pub min_area_fraction: f64,
    /// Accepted width/height range of a blob
    pub aspect_range: (f64, f64),
}

impl Default for SkinToneDetector {
    fn default() -> Self {
        Self {
            cell_size: 8,
            min_cell_fill: 0.5,
            min_area_fraction: 0.02,
            aspect_range: (0.35, 2.5),
        }
    }
}

fn is_skin(r: u8, g: u8, b: u8) -> bool {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b;
    y > 40.0 && (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
}

impl SkinToneDetector {
    /// Mark grid cells whose skin fill reaches the threshold
    fn skin_cells(&self, frame: &Frame) -> (Vec<bool>, usize, usize) {
        let cell = self.cell_size.max(1);
        let (w, h) = (frame.width(), frame.height());
        let gw = w.div_ceil(cell) as usize;
        let gh = h.div_ceil(cell) as usize;

        let mut skin = vec![0u32; gw * gh];
        let mut total = vec![0u32; gw * gh];
        for (x, y, px) in frame.pixels().enumerate_pixels() {
            let idx = (y / cell) as usize * gw + (x / cell) as usize;
            total[idx] += 1;
            if is_skin(px[0], px[1], px[2]) {
                skin[idx] += 1;
            }
        }

        let cells = skin
            .iter()
            .zip(&total)
            .map(|(&s, &t)| t > 0 && f64::from(s) / f64::from(t) >= self.min_cell_fill)
            .collect();
        (cells, gw, gh)
    }
}

impl FaceDetector for SkinToneDetector {
    fn name(&self) -> &'static str {
        "skin-tone"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<FaceBox>, AnalysisFailure> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let (cells, gw, gh) = self.skin_cells(frame);
        let cell = f64::from(self.cell_size.max(1));
        let frame_area = f64::from(frame.width()) * f64::from(frame.height());

        let mut seen = vec![false; cells.len()];
        let mut faces = Vec::new();
        let mut stack = Vec::new();

        for start in 0..cells.len() {
            if !cells[start] || seen[start] {
                continue;
            }

            // Flood fill one 4-connected component
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (gw, gh, 0, 0);
            let mut count = 0usize;
            seen[start] = true;
            stack.push(start);
            while let Some(idx) = stack.pop() {
                let (cx, cy) = (idx % gw, idx / gw);
                count += 1;
                min_x = min_x.min(cx);
                max_x = max_x.max(cx);
                min_y = min_y.min(cy);
                max_y = max_y.max(cy);

                let mut visit = |nx: usize, ny: usize| {
                    let n = ny * gw + nx;
                    if cells[n] && !seen[n] {
                        seen[n] = true;
                        stack.push(n);
                    }
                };
                if cx > 0 {
                    visit(cx - 1, cy);
                }
                if cx + 1 < gw {
                    visit(cx + 1, cy);
                }
                if cy > 0 {
                    visit(cx, cy - 1);
                }
                if cy + 1 < gh {
                    visit(cx, cy + 1);
                }
            }

            let area = count as f64 * cell * cell;
            let x = min_x as f64 * cell;
            let y = min_y as f64 * cell;
            let width = ((max_x + 1) as f64 * cell).min(f64::from(frame.width())) - x;
            let height = ((max_y + 1) as f64 * cell).min(f64::from(frame.height())) - y;
            let aspect = width / height;

            if area / frame_area >= self.min_area_fraction
                && (self.aspect_range.0..=self.aspect_range.1).contains(&aspect)
            {
                faces.push(FaceBox {
                    x,
                    y,
                    width,
                    height,
                });
            }
        }

        faces.sort_by(|a, b| (b.width * b.height).total_cmp(&(a.width * a.height)));
        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const BACKGROUND: Rgb<u8> = Rgb([40, 60, 200]);
    const SKIN: Rgb<u8> = Rgb([224, 172, 140]);

    fn frame_with(rects: &[(u32, u32, u32, u32)]) -> Frame {
        let mut img = RgbImage::from_pixel(320, 240, BACKGROUND);
        for &(x0, y0, w, h) in rects {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    img.put_pixel(x, y, SKIN);
                }
            }
        }
        Frame::from_rgb(img)
    }

    #[test]
    fn test_skin_classifier() {
        assert!(is_skin(SKIN[0], SKIN[1], SKIN[2]));
        assert!(!is_skin(BACKGROUND[0], BACKGROUND[1], BACKGROUND[2]));
        assert!(!is_skin(0, 0, 0));
    }

    #[test]
    fn test_no_face() {
        let faces = SkinToneDetector::default().detect(&frame_with(&[])).unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    fn test_single_centered_face() {
        let faces = SkinToneDetector::default()
            .detect(&frame_with(&[(128, 80, 64, 80)]))
            .unwrap();
        assert_eq!(faces.len(), 1);
        let face = faces[0];
        assert_eq!((face.x, face.y, face.width, face.height), (128.0, 80.0, 64.0, 80.0));
    }

    #[test]
    fn test_two_faces() {
        let faces = SkinToneDetector::default()
            .detect(&frame_with(&[(16, 80, 64, 80), (224, 80, 64, 80)]))
            .unwrap();
        assert_eq!(faces.len(), 2);
    }

    #[test]
    fn test_small_specks_ignored() {
        let faces = SkinToneDetector::default()
            .detect(&frame_with(&[(16, 16, 16, 16)]))
            .unwrap();
        assert!(faces.is_empty());
    }
}

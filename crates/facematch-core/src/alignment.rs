//! Face alignment and cropping for recognizer input.
//!
//! Faces with landmarks are warped onto the five InsightFace reference
//! points with a 4-DOF similarity transform; faces without landmarks are
//! cropped from their box, and images with no face are resized whole.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Reference landmarks defined on a 112×112 canvas.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

const REFERENCE_SIZE: f32 = 112.0;

/// Reference landmarks rescaled to a square canvas of side `size`.
fn reference_landmarks(size: u32) -> [(f32, f32); 5] {
    let s = size as f32 / REFERENCE_SIZE;
    REFERENCE_LANDMARKS_112.map(|(x, y)| (x * s, y * s))
}

/// Least-squares similarity transform from `src` to `dst`.
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for A * [a, b, tx, ty]^T = B, two rows per point:
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [[0.0f32; 4]; 4];
    let mut atb = [0.0f32; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let rows = [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)];
        for (r, target) in rows {
            for j in 0..4 {
                for k in 0..4 {
                    ata[j][k] += r[j] * r[k];
                }
                atb[j] += r[j] * target;
            }
        }
    }

    let [a, b, tx, ty] = solve_4x4(ata, atb);
    [a, -b, tx, b, a, ty]
}

/// Gaussian elimination with partial pivoting. Singular systems yield identity scale.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(a: [[f32; 4]; 4], b: [f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&a[i]);
        m[i][4] = b[i];
    }

    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][4] - tail) / m[i][i];
    }
    x
}

/// Warp `image` through the forward transform `matrix` into a square canvas.
///
/// Bilinear sampling; pixels mapping outside the source are black.
fn warp_affine(image: &RgbImage, matrix: &[f32; 6], out_size: u32) -> RgbImage {
    let (a, b, tx, ty) = (matrix[0], matrix[3], matrix[2], matrix[5]);

    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return RgbImage::new(out_size, out_size);
    }
    let ia = a / det;
    let ib = b / det;

    let (w, h) = (image.width() as i32, image.height() as i32);
    let sample = |x: i32, y: i32, c: usize| -> f32 {
        if x >= 0 && x < w && y >= 0 && y < h {
            image.get_pixel(x as u32, y as u32)[c] as f32
        } else {
            0.0
        }
    };

    RgbImage::from_fn(out_size, out_size, |ox, oy| {
        // Inverse map: src = M^-1 * (dst - t)
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i32;
        let y0 = sy.floor() as i32;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let mut px = [0u8; 3];
        for (c, out) in px.iter_mut().enumerate() {
            let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1, c) * fx * fy;
            *out = val.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(px)
    })
}

/// Align a face to a canonical `size`×`size` crop using its five landmarks.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5], size: u32) -> RgbImage {
    let matrix = estimate_similarity_transform(landmarks, &reference_landmarks(size));
    warp_affine(image, &matrix, size)
}

/// Crop a face box (clamped to the image) and resize it to `size`×`size`.
///
/// Degenerate boxes fall back to the whole image.
pub fn crop_face(image: &RgbImage, face: &BoundingBox, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let x0 = face.x.max(0.0).min(w as f32) as u32;
    let y0 = face.y.max(0.0).min(h as f32) as u32;
    let x1 = (face.x + face.width).max(0.0).min(w as f32) as u32;
    let y1 = (face.y + face.height).max(0.0).min(h as f32) as u32;

    if x1 <= x0 || y1 <= y0 {
        return resize_whole(image, size);
    }
    let region = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    imageops::resize(&region, size, size, FilterType::Triangle)
}

/// Resize the full image to `size`×`size` (no face localization).
pub fn resize_whole(image: &RgbImage, size: u32) -> RgbImage {
    if image.width() == 0 || image.height() == 0 {
        return RgbImage::new(size, size);
    }
    imageops::resize(image, size, size, FilterType::Triangle)
}

/// Produce the recognizer input for `face`, or for the whole image when `None`.
pub fn face_chip(image: &RgbImage, face: Option<&BoundingBox>, size: u32) -> RgbImage {
    match face {
        Some(BoundingBox { landmarks: Some(lms), .. }) => align_face(image, lms, size),
        Some(face) => crop_face(image, face, size),
        None => resize_whole(image, size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let m = estimate_similarity_transform(&pts, &pts);

        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        assert!((m[4] - 1.0).abs() < 1e-4, "a2 = {}", m[4]);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_scaled_transform() {
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let m = estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112);
        assert!((m[0] - 0.5).abs() < 0.05, "a = {}, expected ~0.5", m[0]);
    }

    #[test]
    fn test_reference_landmarks_scale_with_size() {
        let lms = reference_landmarks(224);
        assert!((lms[0].0 - 2.0 * REFERENCE_LANDMARKS_112[0].0).abs() < 1e-4);
        assert_eq!(reference_landmarks(112), REFERENCE_LANDMARKS_112);
    }

    #[test]
    fn test_align_face_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 64, 32]));
        for size in [96, 112, 160] {
            let aligned = align_face(&image, &reference_landmarks(size), size);
            assert_eq!(aligned.dimensions(), (size, size));
        }
    }

    #[test]
    fn test_align_preserves_channels() {
        let image = RgbImage::from_pixel(200, 200, Rgb([200, 100, 50]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS_112, 112);
        // Identity warp over a uniform image keeps the color at the center.
        assert_eq!(aligned.get_pixel(56, 56), &Rgb([200, 100, 50]));
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        let mut image = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        // 5x5 red patch at the left eye survives bilinear interpolation.
        let (lx, ly) = (src[0].0 as u32, src[0].1 as u32);
        for y in ly - 2..=ly + 2 {
            for x in lx - 2..=lx + 2 {
                image.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }

        let aligned = align_face(&image, &src, 112);

        let ref_x = REFERENCE_LANDMARKS_112[0].0.round() as u32;
        let ref_y = REFERENCE_LANDMARKS_112[0].1.round() as u32;
        let mut max_red = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_red = max_red.max(aligned.get_pixel(x, y)[0]);
            }
        }
        assert!(max_red > 100, "expected red patch near ({ref_x}, {ref_y}), max={max_red}");
    }

    #[test]
    fn test_crop_face_clamps_box() {
        let image = RgbImage::from_pixel(100, 80, Rgb([10, 20, 30]));
        let face = BoundingBox {
            x: -20.0, y: 10.0, width: 200.0, height: 50.0,
            confidence: 0.9, landmarks: None,
        };
        let chip = crop_face(&image, &face, 64);
        assert_eq!(chip.dimensions(), (64, 64));
        assert_eq!(chip.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_face_chip_without_face_resizes_whole_image() {
        let image = RgbImage::from_pixel(300, 120, Rgb([1, 2, 3]));
        let chip = face_chip(&image, None, 160);
        assert_eq!(chip.dimensions(), (160, 160));
    }

    #[test]
    fn test_resize_whole_empty_image() {
        let chip = resize_whole(&RgbImage::new(0, 0), 32);
        assert_eq!(chip.dimensions(), (32, 32));
    }
}

//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical 112×112 ArcFace template using
//! the five InsightFace reference landmarks.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// Closed-form least-squares similarity transform mapping `src` onto `dst`.
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    let mean = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (sx / 5.0, sy / 5.0)
    };
    let (smx, smy) = mean(src);
    let (dmx, dmy) = mean(dst);

    let mut norm = 0.0f32;
    let mut a_num = 0.0f32;
    let mut b_num = 0.0f32;
    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (xs, ys) = (sx - smx, sy - smy);
        let (xd, yd) = (dx - dmx, dy - dmy);
        norm += xs * xs + ys * ys;
        a_num += xs * xd + ys * yd;
        b_num += xs * yd - ys * xd;
    }

    // Degenerate landmarks (all coincident): leave the frame untransformed.
    if norm < 1e-12 {
        return IDENTITY;
    }

    let a = a_num / norm;
    let b = b_num / norm;
    let tx = dmx - (a * smx - b * smy);
    let ty = dmy - (b * smx + a * smy);

    [a, -b, tx, b, a, ty]
}

/// Warp `image` into an `out_size`×`out_size` crop with a similarity matrix.
///
/// Bilinear sampling; pixels mapped from outside the source are black.
fn warp_affine(image: &RgbImage, matrix: &[f32; 6], out_size: u32) -> RgbImage {
    let (a, tx, b, ty) = (matrix[0], matrix[2], matrix[3], matrix[5]);

    let det = a * a + b * b;
    if det < 1e-12 {
        return RgbImage::new(out_size, out_size);
    }
    let ia = a / det;
    let ib = b / det;

    let (w, h) = (image.width() as i64, image.height() as i64);
    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x >= 0 && x < w && y >= 0 && y < h {
            image.get_pixel(x as u32, y as u32)[c] as f32
        } else {
            0.0
        }
    };

    RgbImage::from_fn(out_size, out_size, |ox, oy| {
        // src = M^-1 * (dst - t)
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
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

/// Align a detected face to a canonical 112×112 RGB crop for embedding extraction.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(image, &matrix, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let m = estimate_similarity_transform(&pts, &pts);
        for (got, want) in m.iter().zip(IDENTITY.iter()) {
            assert!((got - want).abs() < 1e-3, "matrix {m:?}");
        }
    }

    #[test]
    fn test_scaled_transform() {
        // Source landmarks at 2x scale → a ≈ 0.5, no rotation
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let m = estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112);
        assert!((m[0] - 0.5).abs() < 1e-3, "a = {}", m[0]);
        assert!(m[3].abs() < 1e-3, "b = {}", m[3]);
    }

    #[test]
    fn test_degenerate_landmarks_fall_back_to_identity() {
        let src = [(10.0, 10.0); 5];
        assert_eq!(estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112), IDENTITY);
    }

    #[test]
    fn test_align_face_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let aligned = align_face(&image, &REFERENCE_LANDMARKS_112);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_landmark_lands_on_reference_position() {
        let mut image = RgbImage::new(200, 200);
        let src_landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        // 5x5 red patch on the left eye survives bilinear sampling
        for y in 58..63 {
            for x in 78..83 {
                image.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }

        let aligned = align_face(&image, &src_landmarks);

        let ref_x = REFERENCE_LANDMARKS_112[0].0.round() as u32;
        let ref_y = REFERENCE_LANDMARKS_112[0].1.round() as u32;
        let mut max_red = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                let px = aligned.get_pixel(x, y);
                max_red = max_red.max(px[0]);
                assert_eq!(px[1], 0);
            }
        }
        assert!(max_red > 100, "expected red patch near ({ref_x}, {ref_y}), max={max_red}");
    }
}

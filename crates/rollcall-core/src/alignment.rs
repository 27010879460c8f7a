//! Face alignment via a 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto a canonical template and resamples
//! the face into a square RGB chip for the recognizer.
//!
//! The template is the InsightFace 112px layout scaled to 150px, not dlib's
//! `get_face_chip` geometry (0.25 padding) that the ResNet model was trained
//! on. The 0.6 match threshold (`match_threshold` / `ROLLCALL_MATCH_THRESHOLD`)
//! is calibrated for dlib chips and may need re-tuning for these.

use image::{Rgb, RgbImage};

/// Side of the aligned chip consumed by the recognizer.
pub const CHIP_SIZE: u32 = 150;

/// InsightFace 112px landmark template.
const TEMPLATE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Template landmarks scaled to a `size`-pixel chip.
fn template(size: u32) -> [(f32, f32); 5] {
    let k = size as f32 / 112.0;
    TEMPLATE_112.map(|(x, y)| (x * k, y * k))
}

/// Forward map `(x, y) -> (a*x - b*y + tx, b*x + a*y + ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit taking `src` points onto `dst`.
    ///
    /// Each point pair contributes two rows to the normal equations of
    /// `[x, -y, 1, 0]·p = dx` and `[y, x, 0, 1]·p = dy` with `p = [a, b, tx, ty]`.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let (mx, my) = src.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x / 5.0, ay + y / 5.0));
        let spread: f32 = src.iter().map(|&(x, y)| (x - mx).powi(2) + (y - my).powi(2)).sum();
        if spread < 1e-6 {
            return None;
        }

        let mut normal = [[0.0f32; 5]; 4];

        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            for (row, rhs) in [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)] {
                for j in 0..4 {
                    for k in 0..4 {
                        normal[j][k] += row[j] * row[k];
                    }
                    normal[j][4] += row[j] * rhs;
                }
            }
        }

        let [a, b, tx, ty] = solve(normal)?;
        Some(Self { a, b, tx, ty })
    }

    /// Inverse map from chip coordinates back into the source image.
    fn invert(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some(((self.a * dx + self.b * dy) / det, (self.a * dy - self.b * dx) / det))
    }
}

/// Gaussian elimination with partial pivoting on an augmented 4×5 system.
fn solve(mut m: [[f32; 5]; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }
        for row in col + 1..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = (i + 1..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][4] - tail) / m[i][i];
    }
    Some(x)
}

/// Bilinear RGB sample; pixels outside the image read as black.
fn sample(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let (x0, y0) = (x.floor() as i64, y.floor() as i64);
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let texel = |px: i64, py: i64| -> [f32; 3] {
        if px >= 0 && px < w && py >= 0 && py < h {
            let p = image.get_pixel(px as u32, py as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    let (tl, tr, bl, br) = (texel(x0, y0), texel(x0 + 1, y0), texel(x0, y0 + 1), texel(x0 + 1, y0 + 1));
    Rgb(std::array::from_fn(|c| {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bottom = bl[c] * (1.0 - fx) + br[c] * fx;
        (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
    }))
}

/// Align a detected face into a `CHIP_SIZE`×`CHIP_SIZE` RGB chip.
///
/// A degenerate landmark set yields a black chip.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let Some(transform) = Similarity::estimate(landmarks, &template(CHIP_SIZE)) else {
        tracing::debug!("degenerate landmarks, emitting blank chip");
        return RgbImage::new(CHIP_SIZE, CHIP_SIZE);
    };

    RgbImage::from_fn(CHIP_SIZE, CHIP_SIZE, |ox, oy| {
        match transform.invert(ox as f32, oy as f32) {
            Some((sx, sy)) => sample(image, sx, sy),
            None => Rgb([0, 0, 0]),
        }
    })
}

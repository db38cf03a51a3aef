//! Five-point face alignment onto the 112×112 ArcFace template.
//!
//! Fits a similarity transform (scale, rotation, translation) from detected
//! landmarks to the template in closed form, then resamples the face with
//! bilinear interpolation.

/// Side length of the aligned crop fed to the recognizer.
pub const ALIGNED_SIZE: usize = 112;

/// ArcFace template landmarks in a 112×112 crop.
const TEMPLATE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// `(x, y) -> (a·x - b·y + tx, b·x + a·y + ty)` where `a = s·cosθ`, `b = s·sinθ`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit taking `src` points onto `dst` points.
    fn fit(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let (src_cx, src_cy) = centroid(src);
        let (dst_cx, dst_cy) = centroid(dst);

        let (mut num_a, mut num_b, mut spread) = (0.0f32, 0.0f32, 0.0f32);
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (x, y) = (sx - src_cx, sy - src_cy);
            let (u, v) = (dx - dst_cx, dy - dst_cy);
            num_a += x * u + y * v;
            num_b += x * v - y * u;
            spread += x * x + y * y;
        }

        // Degenerate landmarks (all on one point): translate only.
        let (a, b) = if spread < 1e-12 {
            (1.0, 0.0)
        } else {
            (num_a / spread, num_b / spread)
        };

        Self {
            a,
            b,
            tx: dst_cx - (a * src_cx - b * src_cy),
            ty: dst_cy - (b * src_cx + a * src_cy),
        }
    }

    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

fn centroid(points: &[(f32, f32); 5]) -> (f32, f32) {
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(ax, ay), &(x, y)| (ax + x, ay + y));
    let n = points.len() as f32;
    (sx / n, sy / n)
}

/// Bilinear sample of a grayscale image; pixels outside the frame read as black.
fn sample_bilinear(gray: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let pixel = |px: i64, py: i64| -> f32 {
        if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
            return 0.0;
        }
        gray.get(py as usize * width + px as usize)
            .copied()
            .unwrap_or(0) as f32
    };

    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let top = pixel(x0, y0) * (1.0 - fx) + pixel(x0 + 1, y0) * fx;
    let bottom = pixel(x0, y0 + 1) * (1.0 - fx) + pixel(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Warp the face described by `landmarks` into an `ALIGNED_SIZE`² grayscale crop.
pub fn align_face(gray: &[u8], width: u32, height: u32, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let size = ALIGNED_SIZE;
    let Some(to_source) = Similarity::fit(landmarks, &TEMPLATE_112).inverse() else {
        return vec![0u8; size * size];
    };

    let (w, h) = (width as usize, height as usize);
    (0..size * size)
        .map(|i| {
            let (sx, sy) = to_source.apply(((i % size) as f32, (i / size) as f32));
            sample_bilinear(gray, w, h, sx, sy).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

//! Similarity alignment of a face onto the 112×112 ArcFace landmark template.
//!
//! The transform (rotation, uniform scale, translation) is the least-squares
//! fit from the five detected landmarks to the template; the face is then
//! resampled bilinearly into the template frame.

use crate::shared::frame::Frame;

pub const ALIGNED_SIZE: u32 = 112;

/// Landmark positions the recognition model was trained on, in order:
/// left eye, right eye, nose, left mouth corner, right mouth corner.
pub const ARCFACE_TEMPLATE: [(f64, f64); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Maps `(x, y)` to `(a·x − b·y + tx, b·x + a·y + ty)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Similarity {
    a: f64,
    b: f64,
    tx: f64,
    ty: f64,
}

impl Similarity {
    /// Least-squares similarity taking `src` onto `dst`. `None` when the
    /// source points are coincident.
    pub fn estimate(src: &[(f64, f64); 5], dst: &[(f64, f64); 5]) -> Option<Self> {
        let n = src.len() as f64;
        let mean = |pts: &[(f64, f64); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (mx, my) = mean(src);
        let (mu, mv) = mean(dst);

        let (mut dot, mut cross, mut spread) = (0.0, 0.0, 0.0);
        for ((x, y), (u, v)) in src.iter().zip(dst.iter()) {
            let (xc, yc) = (x - mx, y - my);
            let (uc, vc) = (u - mu, v - mv);
            dot += xc * uc + yc * vc;
            cross += xc * vc - yc * uc;
            spread += xc * xc + yc * yc;
        }
        if spread < 1e-9 {
            return None;
        }

        let a = dot / spread;
        let b = cross / spread;
        Some(Self {
            a,
            b,
            tx: mu - (a * mx - b * my),
            ty: mv - (b * mx + a * my),
        })
    }

    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    pub fn invert(&self) -> Option<Self> {
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

    pub fn scale(&self) -> f64 {
        (self.a * self.a + self.b * self.b).sqrt()
    }
}

/// Warps the face described by `landmarks` (in `frame` coordinates) into
/// an `ALIGNED_SIZE` square. Pixels mapped from outside `frame` are black.
pub fn align_face(frame: &Frame, landmarks: &[(f64, f64); 5]) -> Option<Frame> {
    let to_source = Similarity::estimate(landmarks, &ARCFACE_TEMPLATE)?.invert()?;
    Some(warp(frame, &to_source, ALIGNED_SIZE))
}

fn warp(frame: &Frame, to_source: &Similarity, size: u32) -> Frame {
    let channels = frame.channels() as usize;
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let src = frame.data();
    let mut out = Frame::new(
        vec![0u8; size as usize * size as usize * channels],
        size,
        size,
        frame.channels(),
        frame.index(),
    );
    if w == 0 || h == 0 {
        return out;
    }

    let pixel = |x: usize, y: usize, c: usize| src[(y * w + x) * channels + c] as f64;
    let dst = out.data_mut();
    for v in 0..size as usize {
        for u in 0..size as usize {
            let (sx, sy) = to_source.apply((u as f64, v as f64));
            if sx < 0.0 || sy < 0.0 || sx > (w - 1) as f64 || sy > (h - 1) as f64 {
                continue;
            }
            let (x0, y0) = (sx.floor() as usize, sy.floor() as usize);
            let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
            let (fx, fy) = (sx - x0 as f64, sy - y0 as f64);
            for c in 0..channels {
                let top = pixel(x0, y0, c) * (1.0 - fx) + pixel(x1, y0, c) * fx;
                let bottom = pixel(x0, y1, c) * (1.0 - fx) + pixel(x1, y1, c) * fx;
                dst[(v * size as usize + u) * channels + c] =
                    (top * (1.0 - fy) + bottom * fy).round() as u8;
            }
        }
    }
    out
}

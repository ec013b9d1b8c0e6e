use std::f64::consts::PI;
use std::sync::Arc;

use blob_tv_rs::{Blob, BlobImage, Lattice};

/// Isotropic Gaussian blob, truncated at four standard deviations.
pub struct Gaussian {
    pub sigma: f64,
}

impl Blob for Gaussian {
    fn radius(&self) -> f64 {
        4.0 * self.sigma
    }

    fn value(&self, dx: f64, dy: f64) -> f64 {
        (-(dx * dx + dy * dy) / (2.0 * self.sigma * self.sigma)).exp()
    }

    fn gradient(&self, dx: f64, dy: f64) -> [f64; 2] {
        let v = self.value(dx, dy) / (self.sigma * self.sigma);
        [-dx * v, -dy * v]
    }

    fn projection(&self, t: f64, _theta: f64) -> f64 {
        (2.0 * PI).sqrt() * self.sigma * (-(t * t) / (2.0 * self.sigma * self.sigma)).exp()
    }
}

/// Coarse scale: step 2, 5 nodes. Fine scale: step 1, 13 nodes.
pub fn two_scale_image() -> BlobImage {
    let size = [4.0, 4.0];
    BlobImage::new(
        vec![
            Arc::new(Gaussian { sigma: 1.0 }),
            Arc::new(Gaussian { sigma: 0.5 }),
        ],
        vec![
            Arc::new(Lattice::cartesian(2.0, size, 4.0).unwrap()),
            Arc::new(Lattice::cartesian(1.0, size, 4.0).unwrap()),
        ],
        size,
        4.0,
        2.0,
    )
    .unwrap()
}

pub fn single_scale_image(step: f64, sigma: f64) -> BlobImage {
    let size = [4.0, 4.0];
    BlobImage::single(
        Arc::new(Gaussian { sigma }),
        Arc::new(Lattice::cartesian(step, size, 4.0).unwrap()),
        size,
        4.0,
    )
    .unwrap()
}

/// Deterministic coefficients with varied signs and magnitudes.
pub fn coefficients(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| ((i * 7 + 3) % 11) as f64 / 5.0 - 1.0)
        .collect()
}

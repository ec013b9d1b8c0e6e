use core::fmt;

/// Radially localized basis function translated onto grid nodes.
///
/// Offsets are measured from the blob centre in physical units.
pub trait Blob: Send + Sync {
    /// Radius beyond which the blob is treated as zero.
    fn radius(&self) -> f64;
    /// Value at offset `(dx, dy)`.
    fn value(&self, dx: f64, dy: f64) -> f64;
    /// Spatial gradient at offset `(dx, dy)`.
    fn gradient(&self, dx: f64, dy: f64) -> [f64; 2];
    /// Line integral along the line of direction `theta` at signed distance
    /// `t` from the centre.
    fn projection(&self, t: f64, theta: f64) -> f64;
}

/// Set of active lattice nodes inside a rectangular object support.
pub trait Grid: Send + Sync {
    /// Rectangular object extent `[width, height]`, centred on the origin.
    fn size_obj(&self) -> [f64; 2];
    /// Number of active nodes.
    fn nb_node(&self) -> usize;
    /// Coordinates of the active node `index`.
    fn node(&self, index: usize) -> [f64; 2];
}

#[derive(Debug, Clone, PartialEq)]
pub enum LatticeError {
    /// Sampling step must be positive and finite.
    InvalidStep { step: f64 },
    /// Generator vectors are linearly dependent.
    DegenerateGenerators,
    /// Object size or ROI diameter must be positive and finite.
    InvalidSupport { size_obj: [f64; 2], diam_roi: f64 },
}

impl fmt::Display for LatticeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStep { step } => write!(f, "invalid lattice step {step}"),
            Self::DegenerateGenerators => write!(f, "lattice generators are linearly dependent"),
            Self::InvalidSupport { size_obj, diam_roi } => write!(
                f,
                "invalid support: size_obj=[{}, {}], diam_roi={diam_roi}",
                size_obj[0], size_obj[1]
            ),
        }
    }
}

impl std::error::Error for LatticeError {}

/// Lattice `step * (i * g0 + j * g1)` restricted to the nodes inside both the
/// rectangle `size_obj` and the disc of diameter `diam_roi`, both centred on
/// the origin.
#[derive(Debug, Clone)]
pub struct Lattice {
    generators: [[f64; 2]; 2],
    step: f64,
    size_obj: [f64; 2],
    diam_roi: f64,
    nodes: Vec<[f64; 2]>,
}

impl Lattice {
    pub fn new(
        generators: [[f64; 2]; 2],
        step: f64,
        size_obj: [f64; 2],
        diam_roi: f64,
    ) -> Result<Self, LatticeError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(LatticeError::InvalidStep { step });
        }
        let supported = size_obj.iter().all(|s| s.is_finite() && *s > 0.0)
            && diam_roi.is_finite()
            && diam_roi > 0.0;
        if !supported {
            return Err(LatticeError::InvalidSupport { size_obj, diam_roi });
        }
        let [g0, g1] = generators;
        let det = g0[0] * g1[1] - g0[1] * g1[0];
        if det.abs() < 1e-12 {
            return Err(LatticeError::DegenerateGenerators);
        }

        // Lattice coordinates of the rectangle corners bound the index range.
        let half = [size_obj[0] / 2.0, size_obj[1] / 2.0];
        let mut lo = [f64::INFINITY; 2];
        let mut hi = [f64::NEG_INFINITY; 2];
        for (sx, sy) in [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
            let (px, py) = (sx * half[0] / step, sy * half[1] / step);
            let i = (px * g1[1] - py * g1[0]) / det;
            let j = (py * g0[0] - px * g0[1]) / det;
            lo = [lo[0].min(i), lo[1].min(j)];
            hi = [hi[0].max(i), hi[1].max(j)];
        }

        let radius_sq = diam_roi * diam_roi / 4.0;
        let slack = 1e-9 * step;
        let mut nodes = Vec::new();
        for j in (lo[1].floor() as i64)..=(hi[1].ceil() as i64) {
            for i in (lo[0].floor() as i64)..=(hi[0].ceil() as i64) {
                let x = step * (i as f64 * g0[0] + j as f64 * g1[0]);
                let y = step * (i as f64 * g0[1] + j as f64 * g1[1]);
                let inside = x.abs() <= half[0] + slack
                    && y.abs() <= half[1] + slack
                    && x * x + y * y <= radius_sq + slack;
                if inside {
                    nodes.push([x, y]);
                }
            }
        }

        Ok(Self {
            generators,
            step,
            size_obj,
            diam_roi,
            nodes,
        })
    }

    /// Square lattice with spacing `step`.
    pub fn cartesian(step: f64, size_obj: [f64; 2], diam_roi: f64) -> Result<Self, LatticeError> {
        Self::new([[1.0, 0.0], [0.0, 1.0]], step, size_obj, diam_roi)
    }

    /// Hexagonal lattice with nearest-neighbour distance `step`.
    pub fn hexagonal(step: f64, size_obj: [f64; 2], diam_roi: f64) -> Result<Self, LatticeError> {
        Self::new([[1.0, 0.0], [0.5, 3f64.sqrt() / 2.0]], step, size_obj, diam_roi)
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn generators(&self) -> [[f64; 2]; 2] {
        self.generators
    }

    pub fn diam_roi(&self) -> f64 {
        self.diam_roi
    }

    pub fn nodes(&self) -> &[[f64; 2]] {
        &self.nodes
    }
}

impl Grid for Lattice {
    fn size_obj(&self) -> [f64; 2] {
        self.size_obj
    }

    fn nb_node(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, index: usize) -> [f64; 2] {
        self.nodes[index]
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Blob;

    /// Isotropic Gaussian, truncated at four standard deviations.
    pub(crate) struct Gauss {
        pub(crate) sigma: f64,
    }

    impl Blob for Gauss {
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
            (2.0 * core::f64::consts::PI).sqrt()
                * self.sigma
                * (-(t * t) / (2.0 * self.sigma * self.sigma)).exp()
        }
    }
}

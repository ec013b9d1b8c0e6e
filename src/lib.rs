//! Blob-basis image reconstruction with total variation regularization.
//!
//! An image is modeled as a weighted sum of blobs translated onto the active
//! nodes of one or more lattices (`BlobImage`). Reconstruction solves
//!
//! `min_X TV(X)  s.t.  AX ~ Y  (and optionally X >= 0, AX = Y)`
//!
//! with a TVAL3-style augmented Lagrangian: the auxiliary variable `U ~ GX`
//! is updated by shrinkage, X by a Barzilai-Borwein step under a
//! non-monotone backtracking line search, and the multipliers whenever the
//! inner relative change is small.
//!
//! How it fits together:
//! - Describe the image with `Blob` and `Grid` implementations (`Lattice` is
//!   provided) and build a `BlobImage`.
//! - Build `A` and `G` as `LinOp`s, e.g. with `blob_projector` and
//!   `blob_gradient`, or use `Identity` / `FiniteDifference`.
//! - Create a `TvSolver`, call `solve`, and inspect the `ConvergenceReport`.
//!
//! Example:
//! ```rust,no_run
//! use blob_tv_rs::{FiniteDifference, Identity, TvOptions, TvProblem, TvSolver};
//!
//! let n = 64;
//! let y: Vec<f64> = (0..n).map(|i| if i < n / 2 { 1.0 } else { 0.0 }).collect();
//! let a = Identity::new(n);
//! let g = FiniteDifference::line(n);
//!
//! let mut solver = TvSolver::new(&a, &g).unwrap();
//! let mut x = vec![0.0; n];
//! let mut nu = vec![0.0; n];
//! let options = TvOptions { mu: 8.0, ..TvOptions::default() };
//! let report = solver
//!     .solve(&TvProblem::new(&a, &g, &y), &mut x, &mut nu, &mut [], &options, None)
//!     .unwrap();
//! assert!(report.iterations <= options.max_iters);
//! ```

mod blob;
mod image;
mod linop;
mod metrics;
mod pattern;
mod projector;
mod report;
mod ridge;
mod shrink;
mod solver;
mod sparse;

pub use blob::{Blob, Grid, Lattice, LatticeError};
pub use image::{
    BlobImage, BlobImageError, KeepLargest, PixelGrid, PixelImage, RelativeThreshold,
    ScaleSparsity, SparsityReport, ThresholdPolicy,
};
pub use linop::{FiniteDifference, Identity, LinOp, OperatorShape};
pub use metrics::{corr, snr};
pub use pattern::{PatternError, SparsePattern};
pub use projector::{blob_gradient, blob_interpolator, blob_projector, ParallelBeam, ProjectorError};
pub use report::{
    ConvergenceReport, OuterIterationReport, Reporter, SolveStatus, StdoutReporter,
};
pub use ridge::{RidgeError, RidgeInitializer};
pub use shrink::{gtv_norm, l1_shrink, l1_shrink_into, l2_shrink, l2_shrink_into};
pub use solver::{SolveError, SolverError, TvOptions, TvProblem, TvSolver};
pub use sparse::{SparseError, SparseOperator};

use core::fmt;

use dyn_stack::{GlobalPodBuffer, PodStack, ReborrowMut};
use faer_core::mat;
use faer_core::sparse::SparseColMatRef;
use faer_core::{Conj, Parallelism};
use faer_sparse::qr::{factorize_symbolic_qr, QrSymbolicParams, SymbolicQr};

use crate::linop::LinOp;
use crate::pattern::AugmentedPattern;
use crate::sparse::SparseOperator;

/// Errors while preparing or running the ridge initializer.
#[derive(Debug)]
pub enum RidgeError {
    /// The operator has zero rows or columns.
    InvalidDimensions { nrows: usize, ncols: usize },
    /// faer reported an error during symbolic factorization.
    Faer(faer_sparse::FaerError),
    /// Workspace requirement overflowed.
    WorkspaceOverflow,
    /// Workspace allocation failed.
    WorkspaceAlloc,
    /// Measurement or output vector of the wrong length.
    DimensionMismatch { expected: usize, actual: usize },
    /// Regularization weight must be positive and finite.
    InvalidEpsilon { epsilon: f64 },
}

impl fmt::Display for RidgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { nrows, ncols } => {
                write!(f, "invalid dimensions: nrows={nrows}, ncols={ncols}")
            }
            Self::Faer(err) => write!(f, "faer error: {err:?}"),
            Self::WorkspaceOverflow => write!(f, "workspace size overflow"),
            Self::WorkspaceAlloc => write!(f, "workspace allocation failed"),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "vector length {actual} does not match expected {expected}")
            }
            Self::InvalidEpsilon { epsilon } => {
                write!(f, "regularization weight must be > 0 (got {epsilon})")
            }
        }
    }
}

impl std::error::Error for RidgeError {}

/// Tikhonov least squares `argmin ||A x - y||^2 + epsilon ||x||^2` for a
/// sparse `A`, used to warm-start a TV solve.
///
/// Solves `[A; sqrt(epsilon) I] x = [y; 0]` by sparse QR. The symbolic
/// factorization is computed once per operator.
pub struct RidgeInitializer<'a> {
    operator: &'a SparseOperator,
    augmented: AugmentedPattern,
    symbolic_qr: SymbolicQr<usize>,
    qr_indices: Vec<usize>,
    qr_values: Vec<f64>,
    qr_stack: GlobalPodBuffer,
    parallelism: Parallelism,
    values: Vec<f64>,
    rhs: Vec<f64>,
}

impl<'a> RidgeInitializer<'a> {
    pub fn new(
        operator: &'a SparseOperator,
        parallelism: Parallelism,
    ) -> Result<Self, RidgeError> {
        let pattern = operator.pattern();
        if pattern.nrows() == 0 || pattern.ncols() == 0 {
            return Err(RidgeError::InvalidDimensions {
                nrows: pattern.nrows(),
                ncols: pattern.ncols(),
            });
        }

        let augmented = AugmentedPattern::new(pattern);
        let symbolic_qr =
            factorize_symbolic_qr(augmented.as_symbolic(), QrSymbolicParams::default())
                .map_err(RidgeError::Faer)?;

        let factor_req = symbolic_qr
            .factorize_numeric_qr_req::<f64>(parallelism)
            .map_err(|_| RidgeError::WorkspaceOverflow)?;
        let solve_req = symbolic_qr
            .solve_in_place_req::<f64>(1, parallelism)
            .map_err(|_| RidgeError::WorkspaceOverflow)?;
        let req = factor_req
            .try_or(solve_req)
            .map_err(|_| RidgeError::WorkspaceOverflow)?;
        let qr_stack = GlobalPodBuffer::try_new(req).map_err(|_| RidgeError::WorkspaceAlloc)?;

        // Operator values followed by each column's diagonal slot.
        let mut values = Vec::with_capacity(augmented.nnz());
        for col in 0..pattern.ncols() {
            values.extend_from_slice(operator.values_of_col(col));
            values.push(0.0);
        }
        let qr_indices = vec![0usize; symbolic_qr.len_indices()];
        let qr_values = vec![0.0; symbolic_qr.len_values()];
        let rhs = vec![0.0; augmented.nrows()];

        Ok(Self {
            operator,
            augmented,
            symbolic_qr,
            qr_indices,
            qr_values,
            qr_stack,
            parallelism,
            values,
            rhs,
        })
    }

    /// Writes the regularized least-squares solution into `x`.
    pub fn solve(&mut self, y: &[f64], epsilon: f64, x: &mut [f64]) -> Result<(), RidgeError> {
        let m = self.operator.dim_y();
        let n = self.operator.dim_x();
        if y.len() != m {
            return Err(RidgeError::DimensionMismatch {
                expected: m,
                actual: y.len(),
            });
        }
        if x.len() != n {
            return Err(RidgeError::DimensionMismatch {
                expected: n,
                actual: x.len(),
            });
        }
        if !(epsilon > 0.0 && epsilon.is_finite()) {
            return Err(RidgeError::InvalidEpsilon { epsilon });
        }

        let diag = epsilon.sqrt();
        for &pos in self.augmented.diag_positions() {
            self.values[pos] = diag;
        }
        let a = SparseColMatRef::<'_, usize, f64>::new(
            self.augmented.as_symbolic(),
            self.values.as_slice(),
        );
        self.rhs[..m].copy_from_slice(y);
        self.rhs[m..].fill(0.0);

        let mut stack = PodStack::new(&mut self.qr_stack);
        let qr = self.symbolic_qr.factorize_numeric_qr::<f64>(
            &mut self.qr_indices,
            &mut self.qr_values,
            a,
            self.parallelism,
            stack.rb_mut(),
        );

        let rows = self.augmented.nrows();
        let mut rhs_mat = mat::from_column_major_slice_mut::<f64>(&mut self.rhs, rows, 1);
        let mut stack = PodStack::new(&mut self.qr_stack);
        qr.solve_in_place_with_conj(
            Conj::No,
            rhs_mat.rb_mut(),
            self.parallelism,
            stack.rb_mut(),
        );

        // The least-squares solution is the first n entries.
        x.copy_from_slice(&self.rhs[..n]);
        log::debug!("ridge warm start: {n} coefficients from {m} measurements");
        Ok(())
    }
}

use core::fmt;

use faer_core::sparse::SparseColMatRef;

use crate::linop::{LinOp, OperatorShape};
use crate::pattern::{PatternError, SparsePattern};

/// Errors while assembling a sparse operator.
#[derive(Debug, Clone, PartialEq)]
pub enum SparseError {
    /// The sparsity pattern is invalid.
    Pattern(PatternError),
    /// Values length does not match the pattern's non-zero count.
    ValuesLen { expected: usize, actual: usize },
    /// The declared output shape does not match the pattern rows.
    ShapeMismatch { shape_len: usize, nrows: usize },
}

impl fmt::Display for SparseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(err) => write!(f, "invalid sparsity pattern: {err}"),
            Self::ValuesLen { expected, actual } => {
                write!(f, "values length {actual} does not match nnz {expected}")
            }
            Self::ShapeMismatch { shape_len, nrows } => {
                write!(f, "output shape length {shape_len} does not match nrows {nrows}")
            }
        }
    }
}

impl std::error::Error for SparseError {}

impl From<PatternError> for SparseError {
    fn from(err: PatternError) -> Self {
        Self::Pattern(err)
    }
}

/// Linear operator stored as a compressed-sparse-column matrix.
#[derive(Debug, Clone)]
pub struct SparseOperator {
    pattern: SparsePattern,
    values: Vec<f64>,
    shape: OperatorShape,
}

impl SparseOperator {
    /// Wraps a pattern and matching values; output shape is a plain vector.
    pub fn new(pattern: SparsePattern, values: Vec<f64>) -> Result<Self, SparseError> {
        let shape = OperatorShape::vector(pattern.nrows());
        Self::with_shape(pattern, values, shape)
    }

    pub fn with_shape(
        pattern: SparsePattern,
        values: Vec<f64>,
        shape: OperatorShape,
    ) -> Result<Self, SparseError> {
        if values.len() != pattern.nnz() {
            return Err(SparseError::ValuesLen {
                expected: pattern.nnz(),
                actual: values.len(),
            });
        }
        if shape.len() != pattern.nrows() {
            return Err(SparseError::ShapeMismatch {
                shape_len: shape.len(),
                nrows: pattern.nrows(),
            });
        }
        Ok(Self {
            pattern,
            values,
            shape,
        })
    }

    /// Assembles from `(row, col, value)` triplets; duplicate entries are summed.
    pub fn from_triplets(
        shape: OperatorShape,
        ncols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Result<Self, SparseError> {
        let entries: Vec<(usize, usize)> = triplets.iter().map(|&(r, c, _)| (r, c)).collect();
        let pattern = SparsePattern::from_entries(shape.len(), ncols, &entries)?;
        let mut values = vec![0.0; pattern.nnz()];
        for &(row, col, value) in triplets {
            // Every triplet is in the pattern by construction.
            if let Some(pos) = pattern.position(row, col) {
                values[pos] += value;
            }
        }
        Self::with_shape(pattern, values, shape)
    }

    pub fn pattern(&self) -> &SparsePattern {
        &self.pattern
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Values of one column, aligned with `pattern().row_indices_of_col(col)`.
    pub fn values_of_col(&self, col: usize) -> &[f64] {
        &self.values[self.pattern.col_range(col)]
    }

    /// Borrowed faer view of the matrix.
    pub fn as_faer(&self) -> SparseColMatRef<'_, usize, f64> {
        SparseColMatRef::<'_, usize, f64>::new(self.pattern.as_symbolic(), &self.values)
    }
}

impl LinOp for SparseOperator {
    fn dim_x(&self) -> usize {
        self.pattern.ncols()
    }

    fn shape_y(&self) -> OperatorShape {
        self.shape
    }

    fn forward(&self, x: &[f64], y: &mut [f64]) {
        y.fill(0.0);
        for (col, &xj) in x.iter().enumerate().take(self.pattern.ncols()) {
            if xj == 0.0 {
                continue;
            }
            let rows = self.pattern.row_indices_of_col(col);
            for (&row, &v) in rows.iter().zip(self.values_of_col(col)) {
                y[row] += v * xj;
            }
        }
    }

    fn backward(&self, y: &[f64], x: &mut [f64]) {
        for (col, out) in x.iter_mut().enumerate().take(self.pattern.ncols()) {
            let rows = self.pattern.row_indices_of_col(col);
            let mut sum = 0.0;
            for (&row, &v) in rows.iter().zip(self.values_of_col(col)) {
                sum += v * y[row];
            }
            *out = sum;
        }
    }
}

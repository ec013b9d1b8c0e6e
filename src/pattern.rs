use core::fmt;
use core::ops::Range;

use faer_core::sparse::SymbolicSparseColMatRef;

/// Column-compressed sparsity pattern of a sparse linear operator.
///
/// Built from `(row, col)` entries, so every column holds strictly
/// increasing row indices below `nrows`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsePattern {
    nrows: usize,
    ncols: usize,
    col_ptrs: Vec<usize>,
    row_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// An entry's row is >= nrows.
    RowIndexOutOfBounds { row: usize, col: usize, nrows: usize },
    /// An entry's column is >= ncols.
    ColIndexOutOfBounds { row: usize, col: usize, ncols: usize },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowIndexOutOfBounds { row, col, nrows } => {
                write!(f, "entry ({row}, {col}): row exceeds nrows {nrows}")
            }
            Self::ColIndexOutOfBounds { row, col, ncols } => {
                write!(f, "entry ({row}, {col}): column exceeds ncols {ncols}")
            }
        }
    }
}

impl std::error::Error for PatternError {}

impl SparsePattern {
    /// Builds a pattern from unordered `(row, col)` entries; duplicates collapse.
    pub fn from_entries(
        nrows: usize,
        ncols: usize,
        entries: &[(usize, usize)],
    ) -> Result<Self, PatternError> {
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); ncols];
        for &(row, col) in entries {
            if col >= ncols {
                return Err(PatternError::ColIndexOutOfBounds { row, col, ncols });
            }
            if row >= nrows {
                return Err(PatternError::RowIndexOutOfBounds { row, col, nrows });
            }
            buckets[col].push(row);
        }

        let mut col_ptrs = vec![0; ncols + 1];
        let mut row_indices = Vec::with_capacity(entries.len());
        for (col, mut rows) in buckets.into_iter().enumerate() {
            rows.sort_unstable();
            rows.dedup();
            row_indices.append(&mut rows);
            col_ptrs[col + 1] = row_indices.len();
        }

        Ok(Self {
            nrows,
            ncols,
            col_ptrs,
            row_indices,
        })
    }

    /// Output length of the operator.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Input length of the operator.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.row_indices.len()
    }

    pub fn col_ptrs(&self) -> &[usize] {
        &self.col_ptrs
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    /// Slots of column `col` in the values array.
    pub fn col_range(&self, col: usize) -> Range<usize> {
        self.col_ptrs[col]..self.col_ptrs[col + 1]
    }

    pub fn row_indices_of_col(&self, col: usize) -> &[usize] {
        &self.row_indices[self.col_range(col)]
    }

    /// Slot of `(row, col)` in the values array, if structurally present.
    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.col_ptrs[col];
        self.row_indices_of_col(col)
            .binary_search(&row)
            .ok()
            .map(|offset| start + offset)
    }

    pub(crate) fn as_symbolic(&self) -> SymbolicSparseColMatRef<'_, usize> {
        // Sorted, in-bounds columns by construction.
        unsafe {
            SymbolicSparseColMatRef::new_unchecked(
                self.nrows,
                self.ncols,
                &self.col_ptrs,
                None,
                &self.row_indices,
            )
        }
    }
}

/// Pattern of `[A; D]` with `D` an `ncols x ncols` diagonal block: each
/// column of `A` followed by one slot on row `A.nrows + col`.
#[derive(Debug)]
pub(crate) struct AugmentedPattern {
    inner: SparsePattern,
    diag_positions: Vec<usize>,
}

impl AugmentedPattern {
    pub(crate) fn new(operator: &SparsePattern) -> Self {
        let ncols = operator.ncols();
        let diag_row = operator.nrows();
        let mut col_ptrs = Vec::with_capacity(ncols + 1);
        let mut row_indices = Vec::with_capacity(operator.nnz() + ncols);
        let mut diag_positions = Vec::with_capacity(ncols);
        col_ptrs.push(0);
        for col in 0..ncols {
            row_indices.extend_from_slice(operator.row_indices_of_col(col));
            diag_positions.push(row_indices.len());
            row_indices.push(diag_row + col);
            col_ptrs.push(row_indices.len());
        }

        Self {
            inner: SparsePattern {
                nrows: diag_row + ncols,
                ncols,
                col_ptrs,
                row_indices,
            },
            diag_positions,
        }
    }

    pub(crate) fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    pub(crate) fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// Slot of each column's diagonal entry.
    pub(crate) fn diag_positions(&self) -> &[usize] {
        &self.diag_positions
    }

    pub(crate) fn as_symbolic(&self) -> SymbolicSparseColMatRef<'_, usize> {
        self.inner.as_symbolic()
    }
}

/// Declared output shape of a linear operator: `sites` groups of `rank` components.
///
/// Outputs with `rank > 1` are stored component-major, so component `k` of
/// site `i` lives at index `k * sites + i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorShape {
    pub sites: usize,
    pub rank: usize,
}

impl OperatorShape {
    /// Shape of a plain vector output.
    pub fn vector(len: usize) -> Self {
        Self {
            sites: len,
            rank: 1,
        }
    }

    /// Total output length.
    pub fn len(&self) -> usize {
        self.sites * self.rank
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Linear operator with an exact adjoint.
///
/// `forward` and `backward` overwrite their output buffer completely and must
/// not depend on previous contents.
pub trait LinOp {
    /// Input length (coefficient-vector length).
    fn dim_x(&self) -> usize;
    /// Output shape.
    fn shape_y(&self) -> OperatorShape;
    /// `y = A x`.
    fn forward(&self, x: &[f64], y: &mut [f64]);
    /// `x = A^T y`.
    fn backward(&self, y: &[f64], x: &mut [f64]);

    fn dim_y(&self) -> usize {
        self.shape_y().len()
    }

    /// Allocating form of `forward`.
    fn apply(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.dim_y()];
        self.forward(x, &mut y);
        y
    }

    /// Allocating form of `backward`.
    fn apply_adjoint(&self, y: &[f64]) -> Vec<f64> {
        let mut x = vec![0.0; self.dim_x()];
        self.backward(y, &mut x);
        x
    }
}

/// Identity operator on vectors of length `n`.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    n: usize,
}

impl Identity {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl LinOp for Identity {
    fn dim_x(&self) -> usize {
        self.n
    }

    fn shape_y(&self) -> OperatorShape {
        OperatorShape::vector(self.n)
    }

    fn forward(&self, x: &[f64], y: &mut [f64]) {
        y.copy_from_slice(x);
    }

    fn backward(&self, y: &[f64], x: &mut [f64]) {
        x.copy_from_slice(y);
    }
}

/// Forward-difference gradient on a row-major `rows x cols` grid with
/// periodic boundaries.
///
/// Component 0 differences along a row (`x[r, c + 1] - x[r, c]`), component 1
/// along a column. The 1-D form has rank 1.
#[derive(Debug, Clone, Copy)]
pub struct FiniteDifference {
    rows: usize,
    cols: usize,
    rank: usize,
}

impl FiniteDifference {
    /// 2-D gradient, rank 2.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            rank: 2,
        }
    }

    /// 1-D gradient of a length-`n` signal, rank 1.
    pub fn line(n: usize) -> Self {
        Self {
            rows: 1,
            cols: n,
            rank: 1,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

impl LinOp for FiniteDifference {
    fn dim_x(&self) -> usize {
        self.rows * self.cols
    }

    fn shape_y(&self) -> OperatorShape {
        OperatorShape {
            sites: self.rows * self.cols,
            rank: self.rank,
        }
    }

    fn forward(&self, x: &[f64], y: &mut [f64]) {
        let (rows, cols) = (self.rows, self.cols);
        let n = rows * cols;
        for r in 0..rows {
            let rp1 = if r + 1 < rows { r + 1 } else { 0 };
            for c in 0..cols {
                let cp1 = if c + 1 < cols { c + 1 } else { 0 };
                let idx = r * cols + c;
                y[idx] = x[r * cols + cp1] - x[idx];
                if self.rank == 2 {
                    y[n + idx] = x[rp1 * cols + c] - x[idx];
                }
            }
        }
    }

    fn backward(&self, y: &[f64], x: &mut [f64]) {
        let (rows, cols) = (self.rows, self.cols);
        let n = rows * cols;
        for r in 0..rows {
            let rm1 = if r == 0 { rows - 1 } else { r - 1 };
            for c in 0..cols {
                let cm1 = if c == 0 { cols - 1 } else { c - 1 };
                let idx = r * cols + c;
                let mut acc = y[r * cols + cm1] - y[idx];
                if self.rank == 2 {
                    acc += y[n + rm1 * cols + c] - y[n + idx];
                }
                x[idx] = acc;
            }
        }
    }
}

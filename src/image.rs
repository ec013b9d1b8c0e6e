//! Multi-scale blob image model.
//!
//! A blob image is the sum over scales of one blob translated onto every
//! active node of that scale's grid. Its coefficients live in one flat vector,
//! scale-major with scale 0 the coarsest, each scale in its grid's node order.

use core::fmt;
use core::ops::Range;
use std::sync::Arc;

use crate::blob::{Blob, Grid};
use crate::metrics::max_abs;

/// Errors raised by [`BlobImage`] construction and operations.
#[derive(Debug, Clone, PartialEq)]
pub enum BlobImageError {
    /// No scale was supplied.
    NoScale,
    /// Different numbers of blobs and grids.
    ScaleCount { blobs: usize, grids: usize },
    /// A grid has no active node.
    EmptyScale { scale: usize },
    /// A grid's object size differs from the image's.
    SizeObjMismatch {
        scale: usize,
        expected: [f64; 2],
        actual: [f64; 2],
    },
    /// Flat coefficient vector of the wrong length.
    VectorLen { expected: usize, actual: usize },
    /// Wrong number of per-scale parts passed to `joint`.
    PartCount { expected: usize, actual: usize },
    /// A per-scale part of the wrong length.
    ScaleLen {
        scale: usize,
        expected: usize,
        actual: usize,
    },
    /// The operation needs more scales than the image has.
    TooFewScales { required: usize, actual: usize },
    /// Reweighting epsilon must be strictly positive.
    NonPositiveEpsilon { epsilon: f64 },
    /// Sparsity fraction outside `[0, 1]`.
    InvalidFraction { fraction: f64 },
    /// Pixel image dimensions must be non-zero.
    InvalidPixelDims { rows: usize, cols: usize },
}

impl fmt::Display for BlobImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoScale => write!(f, "a blob image needs at least one scale"),
            Self::ScaleCount { blobs, grids } => {
                write!(f, "{blobs} blobs but {grids} grids")
            }
            Self::EmptyScale { scale } => write!(f, "scale {scale} has no active node"),
            Self::SizeObjMismatch {
                scale,
                expected,
                actual,
            } => write!(
                f,
                "grid of scale {scale} has size_obj [{}, {}], expected [{}, {}]",
                actual[0], actual[1], expected[0], expected[1]
            ),
            Self::VectorLen { expected, actual } => {
                write!(f, "coefficient vector length {actual} does not match {expected} nodes")
            }
            Self::PartCount { expected, actual } => {
                write!(f, "{actual} per-scale parts given for {expected} scales")
            }
            Self::ScaleLen {
                scale,
                expected,
                actual,
            } => write!(
                f,
                "part of scale {scale} has length {actual}, expected {expected}"
            ),
            Self::TooFewScales { required, actual } => {
                write!(f, "operation needs {required} scales, image has {actual}")
            }
            Self::NonPositiveEpsilon { epsilon } => {
                write!(f, "reweighting epsilon must be > 0 (got {epsilon})")
            }
            Self::InvalidFraction { fraction } => {
                write!(f, "sparsity fraction {fraction} outside [0, 1]")
            }
            Self::InvalidPixelDims { rows, cols } => {
                write!(f, "invalid pixel image dimensions {rows}x{cols}")
            }
        }
    }
}

impl std::error::Error for BlobImageError {}

/// Selection rule used by the non-linear approximation and product masks.
pub trait ThresholdPolicy {
    /// Marks the entries of `values` to keep, given the fraction to retain.
    fn select(&self, values: &[f64], fraction: f64) -> Vec<bool>;
}

/// Keeps the `ceil(fraction * n)` entries of largest magnitude; ties keep the
/// lower index.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepLargest;

impl ThresholdPolicy for KeepLargest {
    fn select(&self, values: &[f64], fraction: f64) -> Vec<bool> {
        let n = values.len();
        let count = ((fraction * n as f64 - 1e-9).ceil().max(0.0) as usize).min(n);
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| values[b].abs().total_cmp(&values[a].abs()));
        let mut keep = vec![false; n];
        for &i in &order[..count] {
            keep[i] = true;
        }
        keep
    }
}

/// Keeps entries with `|v| >= (1 - fraction) * max|v|`; nothing when
/// `fraction` is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelativeThreshold;

impl ThresholdPolicy for RelativeThreshold {
    fn select(&self, values: &[f64], fraction: f64) -> Vec<bool> {
        if fraction <= 0.0 {
            return vec![false; values.len()];
        }
        let threshold = (1.0 - fraction) * max_abs(values);
        values.iter().map(|v| v.abs() >= threshold).collect()
    }
}

/// Regular pixel sampling of the object support.
///
/// Pixel `(row, col)` is centred at `x = -w/2 + (col + 0.5) * w / cols`,
/// `y = h/2 - (row + 0.5) * h / rows`; row 0 is the top of the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelGrid {
    pub rows: usize,
    pub cols: usize,
    pub size_obj: [f64; 2],
}

impl PixelGrid {
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel pitch `[dx, dy]`.
    pub fn pixel_size(&self) -> [f64; 2] {
        [
            self.size_obj[0] / self.cols as f64,
            self.size_obj[1] / self.rows as f64,
        ]
    }

    pub fn center(&self, row: usize, col: usize) -> [f64; 2] {
        let [dx, dy] = self.pixel_size();
        [
            -self.size_obj[0] / 2.0 + (col as f64 + 0.5) * dx,
            self.size_obj[1] / 2.0 - (row as f64 + 0.5) * dy,
        ]
    }

    /// Pixels whose centre lies in the square of half-side `radius` around
    /// `center`, with the offset from `center` to the pixel centre.
    pub(crate) fn footprint(
        &self,
        center: [f64; 2],
        radius: f64,
    ) -> impl Iterator<Item = (usize, [f64; 2])> + '_ {
        let [dx, dy] = self.pixel_size();
        let cols = span(center[0] + self.size_obj[0] / 2.0, radius, dx, self.cols);
        let rows = span(self.size_obj[1] / 2.0 - center[1], radius, dy, self.rows);
        rows.flat_map(move |r| {
            cols.clone().map(move |c| {
                let p = self.center(r, c);
                (r * self.cols + c, [p[0] - center[0], p[1] - center[1]])
            })
        })
    }
}

/// Indices `k < n` with `|(k + 0.5) * pitch - pos| <= radius`.
fn span(pos: f64, radius: f64, pitch: f64, n: usize) -> Range<usize> {
    let lo = ((pos - radius) / pitch - 0.5).ceil().max(0.0);
    let hi = (((pos + radius) / pitch - 0.5).floor() + 1.0).clamp(0.0, n as f64);
    let lo = (lo as usize).min(n);
    lo..(hi as usize).max(lo)
}

/// Row-major pixel image.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelImage {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl PixelImage {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }
}

/// Near-zero counts of one scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleSparsity {
    pub nodes: usize,
    pub near_zero: usize,
}

/// Near-zero coefficient counts per scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparsityReport {
    pub scales: Vec<ScaleSparsity>,
}

impl SparsityReport {
    pub fn nodes(&self) -> usize {
        self.scales.iter().map(|s| s.nodes).sum()
    }

    pub fn near_zero(&self) -> usize {
        self.scales.iter().map(|s| s.near_zero).sum()
    }

    /// Fraction of near-zero coefficients over all scales.
    pub fn fraction(&self) -> f64 {
        self.near_zero() as f64 / self.nodes() as f64
    }
}

impl fmt::Display for SparsityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (s, scale) in self.scales.iter().enumerate() {
            writeln!(
                f,
                "scale {s}: {} of {} near zero ({:.2}%)",
                scale.near_zero,
                scale.nodes,
                100.0 * scale.near_zero as f64 / scale.nodes as f64
            )?;
        }
        write!(
            f,
            "total: {} of {} near zero ({:.2}%)",
            self.near_zero(),
            self.nodes(),
            100.0 * self.fraction()
        )
    }
}

struct Scale {
    blob: Arc<dyn Blob>,
    grid: Arc<dyn Grid>,
}

/// Blob image: one `(Blob, Grid)` pair per scale, coarse to fine.
///
/// Blobs and grids are shared handles; several images may reference the same
/// ones. The image is immutable after construction.
pub struct BlobImage {
    scales: Vec<Scale>,
    offsets: Vec<usize>,
    size_obj: [f64; 2],
    diam_roi: f64,
    scaling: f64,
    // coarser[s - 1][i]: nearest node of scale s - 1 to node i of scale s.
    coarser: Vec<Vec<usize>>,
    // finer[i]: nearest node of scale 1 to node i of scale 0.
    finer: Vec<usize>,
}

impl BlobImage {
    /// Single-scale image.
    pub fn single(
        blob: Arc<dyn Blob>,
        grid: Arc<dyn Grid>,
        size_obj: [f64; 2],
        diam_roi: f64,
    ) -> Result<Self, BlobImageError> {
        Self::new(vec![blob], vec![grid], size_obj, diam_roi, 1.0)
    }

    /// Multi-scale image; `scaling > 1` is the dilation between successive
    /// scales, anything else marks a plain superposition of scales.
    pub fn new(
        blobs: Vec<Arc<dyn Blob>>,
        grids: Vec<Arc<dyn Grid>>,
        size_obj: [f64; 2],
        diam_roi: f64,
        scaling: f64,
    ) -> Result<Self, BlobImageError> {
        if blobs.len() != grids.len() {
            return Err(BlobImageError::ScaleCount {
                blobs: blobs.len(),
                grids: grids.len(),
            });
        }
        if blobs.is_empty() {
            return Err(BlobImageError::NoScale);
        }

        let mut offsets = Vec::with_capacity(grids.len() + 1);
        offsets.push(0);
        for (scale, grid) in grids.iter().enumerate() {
            let actual = grid.size_obj();
            let same = actual
                .iter()
                .zip(&size_obj)
                .all(|(a, b)| (a - b).abs() <= 1e-12 * b.abs().max(1.0));
            if !same {
                return Err(BlobImageError::SizeObjMismatch {
                    scale,
                    expected: size_obj,
                    actual,
                });
            }
            if grid.nb_node() == 0 {
                return Err(BlobImageError::EmptyScale { scale });
            }
            offsets.push(offsets[scale] + grid.nb_node());
        }

        let scales: Vec<Scale> = blobs
            .into_iter()
            .zip(grids)
            .map(|(blob, grid)| Scale { blob, grid })
            .collect();

        let coarser = (1..scales.len())
            .map(|s| nearest_nodes(scales[s].grid.as_ref(), scales[s - 1].grid.as_ref()))
            .collect();
        let finer = if scales.len() > 1 {
            nearest_nodes(scales[0].grid.as_ref(), scales[1].grid.as_ref())
        } else {
            Vec::new()
        };

        let image = Self {
            scales,
            offsets,
            size_obj,
            diam_roi,
            scaling,
            coarser,
            finer,
        };
        log::debug!(
            "blob image: {} scales, {} active nodes",
            image.nb_scale(),
            image.nb_node()
        );
        Ok(image)
    }

    /// Total number of active nodes over all scales.
    pub fn nb_node(&self) -> usize {
        self.offsets[self.scales.len()]
    }

    pub fn nb_scale(&self) -> usize {
        self.scales.len()
    }

    pub fn size_obj(&self) -> [f64; 2] {
        self.size_obj
    }

    pub fn diam_roi(&self) -> f64 {
        self.diam_roi
    }

    pub fn scaling(&self) -> f64 {
        self.scaling
    }

    pub fn is_multiscale(&self) -> bool {
        self.scaling > 1.0 && self.scales.len() > 1
    }

    pub fn blob(&self, scale: usize) -> &dyn Blob {
        self.scales[scale].blob.as_ref()
    }

    pub fn grid(&self, scale: usize) -> &dyn Grid {
        self.scales[scale].grid.as_ref()
    }

    /// Range of the flat coefficient vector holding `scale`.
    pub fn scale_range(&self, scale: usize) -> Range<usize> {
        self.offsets[scale]..self.offsets[scale + 1]
    }

    fn check_len(&self, x: &[f64]) -> Result<(), BlobImageError> {
        if x.len() != self.nb_node() {
            return Err(BlobImageError::VectorLen {
                expected: self.nb_node(),
                actual: x.len(),
            });
        }
        Ok(())
    }

    fn scale_fraction(&self, scale: usize, beta: f64, spa: f64) -> f64 {
        if beta > 0.0 {
            (spa * beta.powi(scale as i32)).min(1.0)
        } else {
            spa
        }
    }

    /// Splits a flat coefficient vector into its per-scale parts.
    pub fn separate(&self, x: &[f64]) -> Result<Vec<Vec<f64>>, BlobImageError> {
        self.check_len(x)?;
        Ok((0..self.nb_scale())
            .map(|s| x[self.scale_range(s)].to_vec())
            .collect())
    }

    /// Concatenates per-scale parts into a flat coefficient vector.
    pub fn joint<T: AsRef<[f64]>>(&self, parts: &[T]) -> Result<Vec<f64>, BlobImageError> {
        if parts.len() != self.nb_scale() {
            return Err(BlobImageError::PartCount {
                expected: self.nb_scale(),
                actual: parts.len(),
            });
        }
        let mut x = Vec::with_capacity(self.nb_node());
        for (scale, part) in parts.iter().enumerate() {
            let part = part.as_ref();
            let expected = self.scale_range(scale).len();
            if part.len() != expected {
                return Err(BlobImageError::ScaleLen {
                    scale,
                    expected,
                    actual: part.len(),
                });
            }
            x.extend_from_slice(part);
        }
        Ok(x)
    }

    /// Non-linear approximation scale by scale with the [`KeepLargest`] rule.
    ///
    /// Scale `s` retains the fraction `min(1, spa * beta^s)` of its
    /// coefficients when `beta > 0`, and `spa` otherwise; the rest are zeroed.
    pub fn scalewise_napprx(
        &self,
        xr: &[f64],
        beta: f64,
        spa: f64,
    ) -> Result<Vec<f64>, BlobImageError> {
        self.scalewise_napprx_with(xr, beta, spa, &KeepLargest)
    }

    pub fn scalewise_napprx_with(
        &self,
        xr: &[f64],
        beta: f64,
        spa: f64,
        policy: &dyn ThresholdPolicy,
    ) -> Result<Vec<f64>, BlobImageError> {
        self.check_len(xr)?;
        check_fraction(spa)?;
        let mut out = xr.to_vec();
        for s in 0..self.nb_scale() {
            let range = self.scale_range(s);
            let keep = policy.select(&xr[range.clone()], self.scale_fraction(s, beta, spa));
            for (v, keep) in out[range].iter_mut().zip(keep) {
                if !keep {
                    *v = 0.0;
                }
            }
        }
        Ok(out)
    }

    /// Products of each scale `s >= 1` with its nearest coarser-scale
    /// coefficient. Entry `s - 1` of the result belongs to scale `s`.
    pub fn interscale_product(&self, x: &[f64]) -> Result<Vec<Vec<f64>>, BlobImageError> {
        self.check_len(x)?;
        if self.nb_scale() < 2 {
            return Err(BlobImageError::TooFewScales {
                required: 2,
                actual: self.nb_scale(),
            });
        }
        Ok(self.coarser_products(x))
    }

    fn coarser_products(&self, x: &[f64]) -> Vec<Vec<f64>> {
        (1..self.nb_scale())
            .map(|s| {
                let fine = &x[self.scale_range(s)];
                let coarse = &x[self.scale_range(s - 1)];
                fine.iter()
                    .zip(&self.coarser[s - 1])
                    .map(|(v, &p)| v * coarse[p])
                    .collect()
            })
            .collect()
    }

    /// Product for the coarsest scale, which has no coarser neighbour: each
    /// coefficient times its nearest scale-1 coefficient, or its own square
    /// for a single-scale image.
    pub fn firstscale_product(&self, x: &[f64]) -> Result<Vec<f64>, BlobImageError> {
        self.check_len(x)?;
        let first = &x[self.scale_range(0)];
        if self.nb_scale() < 2 {
            return Ok(first.iter().map(|v| v * v).collect());
        }
        let next = &x[self.scale_range(1)];
        Ok(first
            .iter()
            .zip(&self.finer)
            .map(|(v, &c)| v * next[c])
            .collect())
    }

    /// Flat vector of first-scale and interscale products, in coefficient order.
    pub fn interscale_product_flat(&self, x: &[f64]) -> Result<Vec<f64>, BlobImageError> {
        let mut out = self.firstscale_product(x)?;
        for part in self.coarser_products(x) {
            out.extend(part);
        }
        Ok(out)
    }

    /// Per-scale mask of the nodes with the largest interscale products.
    pub fn scalewise_prodmask(
        &self,
        x: &[f64],
        beta: f64,
        spa: f64,
    ) -> Result<Vec<bool>, BlobImageError> {
        self.scalewise_prodmask_with(x, beta, spa, &KeepLargest)
    }

    pub fn scalewise_prodmask_with(
        &self,
        x: &[f64],
        beta: f64,
        spa: f64,
        policy: &dyn ThresholdPolicy,
    ) -> Result<Vec<bool>, BlobImageError> {
        check_fraction(spa)?;
        let products = self.interscale_product_flat(x)?;
        let mut mask = Vec::with_capacity(self.nb_node());
        for s in 0..self.nb_scale() {
            let fraction = self.scale_fraction(s, beta, spa);
            mask.extend(policy.select(&products[self.scale_range(s)], fraction));
        }
        Ok(mask)
    }

    /// Mask of the nodes with the largest interscale products over all scales.
    pub fn prodmask(&self, x: &[f64], spa: f64) -> Result<Vec<bool>, BlobImageError> {
        check_fraction(spa)?;
        let products = self.interscale_product_flat(x)?;
        Ok(KeepLargest.select(&products, spa))
    }

    /// Counts coefficients with `|x| <= EPSILON * max|x|`, per scale.
    pub fn sparsity(&self, x: &[f64]) -> Result<SparsityReport, BlobImageError> {
        self.check_len(x)?;
        let cutoff = f64::EPSILON * max_abs(x);
        let scales = (0..self.nb_scale())
            .map(|s| {
                let part = &x[self.scale_range(s)];
                ScaleSparsity {
                    nodes: part.len(),
                    near_zero: part.iter().filter(|v| v.abs() <= cutoff).count(),
                }
            })
            .collect();
        let report = SparsityReport { scales };
        log::debug!(
            "sparsity: {} of {} coefficients near zero",
            report.near_zero(),
            report.nodes()
        );
        Ok(report)
    }

    /// Weights `1 / (|x_i| + rw_epsilon)` for reweighted L1 reconstruction.
    pub fn reweighting_mask(&self, x: &[f64], rw_epsilon: f64) -> Result<Vec<f64>, BlobImageError> {
        self.check_len(x)?;
        if !(rw_epsilon > 0.0) {
            return Err(BlobImageError::NonPositiveEpsilon {
                epsilon: rw_epsilon,
            });
        }
        Ok(x.iter().map(|v| 1.0 / (v.abs() + rw_epsilon)).collect())
    }

    /// Pixel grid of `dim = [rows, cols]` over this image's support.
    pub fn pixel_grid(&self, dim: [usize; 2]) -> Result<PixelGrid, BlobImageError> {
        let [rows, cols] = dim;
        if rows == 0 || cols == 0 {
            return Err(BlobImageError::InvalidPixelDims { rows, cols });
        }
        Ok(PixelGrid {
            rows,
            cols,
            size_obj: self.size_obj,
        })
    }

    fn render_scale(&self, x: &[f64], scale: usize, pixels: &PixelGrid, image: &mut PixelImage) {
        let blob = self.blob(scale);
        let grid = self.grid(scale);
        let radius = blob.radius();
        for (node, &coeff) in x[self.scale_range(scale)].iter().enumerate() {
            if coeff == 0.0 {
                continue;
            }
            for (pix, [dx, dy]) in pixels.footprint(grid.node(node), radius) {
                image.data[pix] += coeff * blob.value(dx, dy);
            }
        }
    }

    /// Samples the blob image on a `dim = [rows, cols]` pixel grid.
    pub fn blob2pixel(&self, x: &[f64], dim: [usize; 2]) -> Result<PixelImage, BlobImageError> {
        self.check_len(x)?;
        let pixels = self.pixel_grid(dim)?;
        let mut image = PixelImage::zeros(pixels.rows, pixels.cols);
        for s in 0..self.nb_scale() {
            self.render_scale(x, s, &pixels, &mut image);
        }
        Ok(image)
    }

    /// One sampled image per scale.
    pub fn blob2multipixel(
        &self,
        x: &[f64],
        dim: [usize; 2],
    ) -> Result<Vec<PixelImage>, BlobImageError> {
        self.check_len(x)?;
        let pixels = self.pixel_grid(dim)?;
        Ok((0..self.nb_scale())
            .map(|s| {
                let mut image = PixelImage::zeros(pixels.rows, pixels.cols);
                self.render_scale(x, s, &pixels, &mut image);
                image
            })
            .collect())
    }

    /// Sampled spatial gradient `[d/dx, d/dy]` of the blob image.
    pub fn blob2pixelgrad(
        &self,
        x: &[f64],
        dim: [usize; 2],
    ) -> Result<[PixelImage; 2], BlobImageError> {
        self.check_len(x)?;
        let pixels = self.pixel_grid(dim)?;
        let mut gx = PixelImage::zeros(pixels.rows, pixels.cols);
        let mut gy = PixelImage::zeros(pixels.rows, pixels.cols);
        for s in 0..self.nb_scale() {
            let blob = self.blob(s);
            let grid = self.grid(s);
            for (node, &coeff) in x[self.scale_range(s)].iter().enumerate() {
                if coeff == 0.0 {
                    continue;
                }
                for (pix, [dx, dy]) in pixels.footprint(grid.node(node), blob.radius()) {
                    let [ddx, ddy] = blob.gradient(dx, dy);
                    gx.data[pix] += coeff * ddx;
                    gy.data[pix] += coeff * ddy;
                }
            }
        }
        Ok([gx, gy])
    }
}

impl fmt::Display for BlobImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Blob image")?;
        writeln!(
            f,
            "size_obj: [{}, {}], diam_roi: {}, scaling: {}",
            self.size_obj[0], self.size_obj[1], self.diam_roi, self.scaling
        )?;
        for s in 0..self.nb_scale() {
            writeln!(
                f,
                "scale {s}: {} active nodes, blob radius {}",
                self.scale_range(s).len(),
                self.blob(s).radius()
            )?;
        }
        write!(f, "total active nodes: {}", self.nb_node())
    }
}

impl fmt::Debug for BlobImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobImage")
            .field("nb_scale", &self.nb_scale())
            .field("nb_node", &self.nb_node())
            .field("size_obj", &self.size_obj)
            .field("diam_roi", &self.diam_roi)
            .field("scaling", &self.scaling)
            .finish()
    }
}

fn check_fraction(fraction: f64) -> Result<(), BlobImageError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(BlobImageError::InvalidFraction { fraction });
    }
    Ok(())
}

/// For each node of `from`, the index of the nearest node of `to`.
fn nearest_nodes(from: &dyn Grid, to: &dyn Grid) -> Vec<usize> {
    (0..from.nb_node())
        .map(|i| {
            let p = from.node(i);
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for j in 0..to.nb_node() {
                let q = to.node(j);
                let d = (p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2);
                if d < best_dist {
                    best_dist = d;
                    best = j;
                }
            }
            best
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::testing::Gauss;
    use crate::blob::Lattice;

    fn two_scale() -> BlobImage {
        let size = [4.0, 4.0];
        let coarse = Lattice::cartesian(2.0, size, 4.0).unwrap();
        let fine = Lattice::cartesian(1.0, size, 4.0).unwrap();
        BlobImage::new(
            vec![Arc::new(Gauss { sigma: 1.0 }), Arc::new(Gauss { sigma: 0.5 })],
            vec![Arc::new(coarse), Arc::new(fine)],
            size,
            4.0,
            2.0,
        )
        .unwrap()
    }

    #[test]
    fn offsets_follow_scales() {
        let image = two_scale();
        assert_eq!(image.nb_scale(), 2);
        assert_eq!(image.scale_range(0), 0..5);
        assert_eq!(image.scale_range(1), 5..18);
        assert_eq!(image.nb_node(), 18);
        assert!(image.is_multiscale());
    }

    #[test]
    fn keep_largest_is_stable_on_ties() {
        let keep = KeepLargest.select(&[1.0, -3.0, 3.0, 0.5], 0.5);
        assert_eq!(keep, vec![false, true, true, false]);
        let keep = KeepLargest.select(&[2.0, 2.0, 2.0], 0.34);
        assert_eq!(keep, vec![true, true, false]);
    }

    #[test]
    fn relative_threshold_keeps_near_max() {
        let keep = RelativeThreshold.select(&[1.0, -4.0, 3.5, 2.0], 0.25);
        assert_eq!(keep, vec![false, true, true, false]);
        assert!(RelativeThreshold.select(&[1.0], 0.0).iter().all(|k| !k));
    }

    #[test]
    fn span_clamps_to_image() {
        assert_eq!(span(0.0, 1.0, 1.0, 4), 0..1);
        assert_eq!(span(2.0, 1.0, 1.0, 4), 1..3);
        assert_eq!(span(10.0, 1.0, 1.0, 4), 4..4);
    }

    #[test]
    fn single_scale_product_is_square() {
        let lattice = Lattice::cartesian(1.0, [2.0, 2.0], 10.0).unwrap();
        let image = BlobImage::single(
            Arc::new(Gauss { sigma: 0.5 }),
            Arc::new(lattice),
            [2.0, 2.0],
            10.0,
        )
        .unwrap();
        let x: Vec<f64> = (0..9).map(|i| i as f64 - 4.0).collect();
        let p = image.firstscale_product(&x).unwrap();
        assert_eq!(p[0], 16.0);
        assert_eq!(p[4], 0.0);
        assert!(matches!(
            image.interscale_product(&x),
            Err(BlobImageError::TooFewScales { required: 2, actual: 1 })
        ));
    }
}

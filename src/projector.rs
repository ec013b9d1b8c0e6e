//! Sparse system matrices built from a [`BlobImage`].
//!
//! Every builder walks each scale's active nodes, evaluates the blob over the
//! node's footprint and assembles the resulting column into a
//! [`SparseOperator`], so forward and adjoint share one exact matrix.

use core::f64::consts::PI;
use core::fmt;

use crate::image::{BlobImage, BlobImageError};
use crate::linop::OperatorShape;
use crate::sparse::{SparseError, SparseOperator};

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectorError {
    Image(BlobImageError),
    Sparse(SparseError),
    /// Detector geometry with no bins, no angles, or a non-positive width.
    InvalidGeometry { nb_proj: usize, pix_det: usize, size_det: f64 },
}

impl fmt::Display for ProjectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(err) => write!(f, "blob image: {err}"),
            Self::Sparse(err) => write!(f, "sparse assembly: {err}"),
            Self::InvalidGeometry {
                nb_proj,
                pix_det,
                size_det,
            } => write!(
                f,
                "invalid geometry: nb_proj={nb_proj}, pix_det={pix_det}, size_det={size_det}"
            ),
        }
    }
}

impl std::error::Error for ProjectorError {}

impl From<BlobImageError> for ProjectorError {
    fn from(err: BlobImageError) -> Self {
        Self::Image(err)
    }
}

impl From<SparseError> for ProjectorError {
    fn from(err: SparseError) -> Self {
        Self::Sparse(err)
    }
}

/// Parallel-beam acquisition: `nb_proj` angles evenly spread over `[0, pi)`,
/// each seen by a centred detector of `pix_det` bins covering `size_det`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParallelBeam {
    pub nb_proj: usize,
    pub pix_det: usize,
    pub size_det: f64,
}

impl ParallelBeam {
    pub fn angle(&self, proj: usize) -> f64 {
        PI * proj as f64 / self.nb_proj as f64
    }

    /// Signed position of the centre of detector bin `bin`.
    pub fn bin_center(&self, bin: usize) -> f64 {
        let pitch = self.size_det / self.pix_det as f64;
        -self.size_det / 2.0 + (bin as f64 + 0.5) * pitch
    }

    fn validate(&self) -> Result<(), ProjectorError> {
        if self.nb_proj == 0 || self.pix_det == 0 || !(self.size_det > 0.0) {
            return Err(ProjectorError::InvalidGeometry {
                nb_proj: self.nb_proj,
                pix_det: self.pix_det,
                size_det: self.size_det,
            });
        }
        Ok(())
    }
}

/// Blob-to-pixel interpolation: row `r * cols + c` samples pixel `(r, c)`.
pub fn blob_interpolator(
    image: &BlobImage,
    dim: [usize; 2],
) -> Result<SparseOperator, ProjectorError> {
    let pixels = image.pixel_grid(dim)?;
    let mut triplets = Vec::new();
    for s in 0..image.nb_scale() {
        let blob = image.blob(s);
        let grid = image.grid(s);
        let offset = image.scale_range(s).start;
        for node in 0..grid.nb_node() {
            for (pix, [dx, dy]) in pixels.footprint(grid.node(node), blob.radius()) {
                let v = blob.value(dx, dy);
                if v != 0.0 {
                    triplets.push((pix, offset + node, v));
                }
            }
        }
    }
    log::debug!("interpolator: {} entries for {} pixels", triplets.len(), pixels.len());
    Ok(SparseOperator::from_triplets(
        OperatorShape::vector(pixels.len()),
        image.nb_node(),
        &triplets,
    )?)
}

/// Sampled spatial gradient, rank 2: component 0 is `d/dx`, component 1 `d/dy`.
pub fn blob_gradient(
    image: &BlobImage,
    dim: [usize; 2],
) -> Result<SparseOperator, ProjectorError> {
    let pixels = image.pixel_grid(dim)?;
    let sites = pixels.len();
    let mut triplets = Vec::new();
    for s in 0..image.nb_scale() {
        let blob = image.blob(s);
        let grid = image.grid(s);
        let offset = image.scale_range(s).start;
        for node in 0..grid.nb_node() {
            for (pix, [dx, dy]) in pixels.footprint(grid.node(node), blob.radius()) {
                let [gx, gy] = blob.gradient(dx, dy);
                if gx != 0.0 {
                    triplets.push((pix, offset + node, gx));
                }
                if gy != 0.0 {
                    triplets.push((sites + pix, offset + node, gy));
                }
            }
        }
    }
    Ok(SparseOperator::from_triplets(
        OperatorShape { sites, rank: 2 },
        image.nb_node(),
        &triplets,
    )?)
}

/// Parallel-beam projector: row `p * pix_det + d` is the line integral of the
/// image at angle `p` through the centre of detector bin `d`.
pub fn blob_projector(
    image: &BlobImage,
    geometry: &ParallelBeam,
) -> Result<SparseOperator, ProjectorError> {
    geometry.validate()?;
    let pitch = geometry.size_det / geometry.pix_det as f64;
    let mut triplets = Vec::new();
    for p in 0..geometry.nb_proj {
        let theta = geometry.angle(p);
        let (sin, cos) = theta.sin_cos();
        for s in 0..image.nb_scale() {
            let blob = image.blob(s);
            let grid = image.grid(s);
            let radius = blob.radius();
            let offset = image.scale_range(s).start;
            for node in 0..grid.nb_node() {
                let [x, y] = grid.node(node);
                let t_node = x * cos + y * sin;
                // Bins whose centre lies within the blob radius of t_node.
                let lo = ((t_node - radius + geometry.size_det / 2.0) / pitch - 0.5)
                    .ceil()
                    .max(0.0) as usize;
                let hi = ((t_node + radius + geometry.size_det / 2.0) / pitch - 0.5).floor();
                if hi < 0.0 {
                    continue;
                }
                let hi = (hi as usize).min(geometry.pix_det - 1);
                for d in lo..=hi {
                    let v = blob.projection(geometry.bin_center(d) - t_node, theta);
                    if v != 0.0 {
                        triplets.push((p * geometry.pix_det + d, offset + node, v));
                    }
                }
            }
        }
    }
    log::debug!(
        "projector: {} angles x {} bins, {} entries",
        geometry.nb_proj,
        geometry.pix_det,
        triplets.len()
    );
    Ok(SparseOperator::from_triplets(
        OperatorShape::vector(geometry.nb_proj * geometry.pix_det),
        image.nb_node(),
        &triplets,
    )?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::blob::testing::Gauss;
    use crate::blob::Lattice;
    use crate::linop::LinOp;

    fn image() -> BlobImage {
        let lattice = Lattice::cartesian(0.5, [4.0, 4.0], 4.0).unwrap();
        BlobImage::single(Arc::new(Gauss { sigma: 0.4 }), Arc::new(lattice), [4.0, 4.0], 4.0)
            .unwrap()
    }

    #[test]
    fn interpolator_matches_blob2pixel() {
        let image = image();
        let x: Vec<f64> = (0..image.nb_node()).map(|i| (i % 7) as f64 - 2.0).collect();
        let op = blob_interpolator(&image, [16, 16]).unwrap();
        let rendered = image.blob2pixel(&x, [16, 16]).unwrap();
        for (a, b) in op.apply(&x).iter().zip(&rendered.data) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn projection_of_centred_blob_peaks_at_centre_bin() {
        let lattice = Lattice::cartesian(1.0, [2.0, 2.0], 0.5).unwrap();
        let image =
            BlobImage::single(Arc::new(Gauss { sigma: 0.3 }), Arc::new(lattice), [2.0, 2.0], 0.5)
                .unwrap();
        assert_eq!(image.nb_node(), 1);
        let geometry = ParallelBeam {
            nb_proj: 4,
            pix_det: 9,
            size_det: 3.0,
        };
        let op = blob_projector(&image, &geometry).unwrap();
        let sino = op.apply(&[1.0]);
        for p in 0..4 {
            let row = &sino[p * 9..(p + 1) * 9];
            let peak = (0..9).max_by(|&a, &b| row[a].total_cmp(&row[b])).unwrap();
            assert_eq!(peak, 4);
        }
    }

    #[test]
    fn rejects_empty_detector() {
        let geometry = ParallelBeam {
            nb_proj: 3,
            pix_det: 0,
            size_det: 1.0,
        };
        assert!(matches!(
            blob_projector(&image(), &geometry),
            Err(ProjectorError::InvalidGeometry { .. })
        ));
    }
}

//! Proximal operators of the anisotropic and isotropic TV norms.
//!
//! Grouped vectors use the component-major layout of [`OperatorShape`]:
//! a vector of `sites * rank` entries holds component `k` of site `i` at
//! `k * sites + i`.
//!
//! [`OperatorShape`]: crate::OperatorShape

/// Soft thresholding: `sign(x) * max(|x| - t, 0)`.
#[inline]
fn soft(x: f64, threshold: f64) -> f64 {
    if x > threshold {
        x - threshold
    } else if x < -threshold {
        x + threshold
    } else {
        0.0
    }
}

/// Elementwise soft threshold of `v` by `1 / beta`, written into `out`.
pub fn l1_shrink_into(v: &[f64], beta: f64, out: &mut [f64]) {
    let threshold = 1.0 / beta;
    for (o, &x) in out.iter_mut().zip(v) {
        *o = soft(x, threshold);
    }
}

/// Grouped soft threshold: the norm of each site's `rank` components is
/// reduced by `1 / beta`, direction preserved. With `rank == 0` there are no
/// groups and `v` is copied through unchanged.
pub fn l2_shrink_into(v: &[f64], beta: f64, rank: usize, out: &mut [f64]) {
    if rank == 0 {
        for (o, &x) in out.iter_mut().zip(v) {
            *o = x;
        }
        return;
    }
    let threshold = 1.0 / beta;
    let sites = v.len() / rank;
    for i in 0..sites {
        let mut norm_sq = 0.0;
        for k in 0..rank {
            let c = v[k * sites + i];
            norm_sq += c * c;
        }
        let norm = norm_sq.sqrt();
        let factor = if norm > threshold {
            (norm - threshold) / norm
        } else {
            0.0
        };
        for k in 0..rank {
            out[k * sites + i] = v[k * sites + i] * factor;
        }
    }
}

pub fn l1_shrink(v: &[f64], beta: f64) -> Vec<f64> {
    let mut out = vec![0.0; v.len()];
    l1_shrink_into(v, beta, &mut out);
    out
}

pub fn l2_shrink(v: &[f64], beta: f64, rank: usize) -> Vec<f64> {
    let mut out = vec![0.0; v.len()];
    l2_shrink_into(v, beta, rank, &mut out);
    out
}

/// Sum over sites of the Euclidean norm of each site's `rank` components;
/// 0 when `rank == 0`.
pub fn gtv_norm(v: &[f64], rank: usize) -> f64 {
    if rank == 0 {
        return 0.0;
    }
    let sites = v.len() / rank;
    (0..sites)
        .map(|i| {
            (0..rank)
                .map(|k| v[k * sites + i] * v[k * sites + i])
                .sum::<f64>()
                .sqrt()
        })
        .sum()
}

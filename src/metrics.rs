/// Signal-to-noise ratio of `x` against `reference`, in dB:
/// `20 * log10(||reference|| / ||x - reference||)`.
///
/// Infinite when `x == reference`.
pub fn snr(x: &[f64], reference: &[f64]) -> f64 {
    let mut err = 0.0;
    for (a, b) in x.iter().zip(reference) {
        err += (a - b) * (a - b);
    }
    20.0 * (l2_norm(reference) / err.sqrt()).log10()
}

/// Pearson correlation between `x` and `reference`.
pub fn corr(x: &[f64], reference: &[f64]) -> f64 {
    let n = x.len().min(reference.len()) as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_r = reference.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_r = 0.0;
    for (a, b) in x.iter().zip(reference) {
        let da = a - mean_x;
        let db = b - mean_r;
        cov += da * db;
        var_x += da * da;
        var_r += db * db;
    }
    cov / (var_x * var_r).sqrt()
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

pub(crate) fn l2_norm(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

pub(crate) fn max_abs(x: &[f64]) -> f64 {
    let mut max = 0.0;
    for &v in x {
        let v = v.abs();
        if v > max {
            max = v;
        }
    }
    max
}

/// `||a - b||`.
pub(crate) fn distance(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += (x - y) * (x - y);
    }
    sum.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snr_of_scaled_error() {
        let reference = [3.0, 4.0];
        let x = [3.0, 4.5];
        // ||ref|| = 5, ||err|| = 0.5.
        assert!((snr(&x, &reference) - 20.0).abs() < 1e-12);
        assert!(snr(&reference, &reference).is_infinite());
    }

    #[test]
    fn correlation_is_scale_invariant() {
        let reference = [1.0, 2.0, 4.0, 3.0];
        let x: Vec<f64> = reference.iter().map(|v| 2.0 * v + 1.0).collect();
        assert!((corr(&x, &reference) - 1.0).abs() < 1e-12);
        let neg: Vec<f64> = reference.iter().map(|v| -v).collect();
        assert!((corr(&neg, &reference) + 1.0).abs() < 1e-12);
    }
}

mod common;

use std::sync::Arc;

use blob_tv_rs::{
    blob_gradient, blob_interpolator, blob_projector, BlobImage, BlobImageError, Grid, Lattice,
    LinOp, ParallelBeam, RelativeThreshold, RidgeInitializer, TvOptions, TvProblem, TvSolver,
};
use common::gaussian::{coefficients, single_scale_image, two_scale_image, Gaussian};
use faer_core::Parallelism;

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn assert_adjoint<A: LinOp>(op: &A) {
    let x = coefficients(op.dim_x());
    let y: Vec<f64> = (0..op.dim_y()).map(|i| ((i % 5) as f64 - 2.0) * 0.3).collect();
    let lhs = dot(&op.apply(&x), &y);
    let rhs = dot(&x, &op.apply_adjoint(&y));
    let scale = lhs.abs().max(rhs.abs()).max(1.0);
    assert!((lhs - rhs).abs() <= 1e-10 * scale, "{lhs} vs {rhs}");
}

#[test]
fn separate_then_joint_restores_vector() {
    let image = two_scale_image();
    let x = coefficients(image.nb_node());
    let parts = image.separate(&x).unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].len(), 5);
    assert_eq!(parts[1].len(), 13);
    assert_eq!(parts[1][0], x[5]);
    assert_eq!(image.joint(&parts).unwrap(), x);
}

#[test]
fn joint_rejects_malformed_parts() {
    let image = two_scale_image();
    let err = image.joint(&[vec![0.0; 5]]).unwrap_err();
    assert_eq!(
        err,
        BlobImageError::PartCount {
            expected: 2,
            actual: 1
        }
    );
    let err = image.joint(&[vec![0.0; 5], vec![0.0; 12]]).unwrap_err();
    assert_eq!(
        err,
        BlobImageError::ScaleLen {
            scale: 1,
            expected: 13,
            actual: 12
        }
    );
    let err = image.separate(&[0.0; 17]).unwrap_err();
    assert_eq!(
        err,
        BlobImageError::VectorLen {
            expected: 18,
            actual: 17
        }
    );
}

#[test]
fn construction_validates_scales() {
    let size = [4.0, 4.0];
    let lattice = Arc::new(Lattice::cartesian(1.0, size, 4.0).unwrap());
    let err = BlobImage::new(
        vec![Arc::new(Gaussian { sigma: 1.0 })],
        vec![lattice.clone(), lattice],
        size,
        4.0,
        2.0,
    )
    .unwrap_err();
    assert_eq!(err, BlobImageError::ScaleCount { blobs: 1, grids: 2 });

    let other = Arc::new(Lattice::cartesian(1.0, [6.0, 4.0], 4.0).unwrap());
    let err = BlobImage::single(Arc::new(Gaussian { sigma: 1.0 }), other, size, 4.0).unwrap_err();
    assert!(matches!(err, BlobImageError::SizeObjMismatch { scale: 0, .. }));

    let err = BlobImage::new(Vec::new(), Vec::new(), size, 4.0, 1.0).unwrap_err();
    assert_eq!(err, BlobImageError::NoScale);
}

#[test]
fn describes_itself() {
    let image = two_scale_image();
    assert!(image.is_multiscale());
    assert_eq!(image.scaling(), 2.0);
    assert_eq!(image.diam_roi(), 4.0);
    let text = image.to_string();
    assert!(text.contains("scale 0: 5 active nodes"));
    assert!(text.contains("total active nodes: 18"));
    assert!(!single_scale_image(1.0, 0.5).is_multiscale());
}

#[test]
fn napprx_keeps_largest_fraction_per_scale() {
    let image = two_scale_image();
    // Magnitudes 1..=18 with alternating signs.
    let x: Vec<f64> = (0..18)
        .map(|i| if i % 2 == 0 { (i + 1) as f64 } else { -((i + 1) as f64) })
        .collect();

    let flat = image.scalewise_napprx(&x, 0.0, 0.4).unwrap();
    let kept: Vec<usize> = (0..18).filter(|&i| flat[i] != 0.0).collect();
    assert_eq!(kept, vec![3, 4, 12, 13, 14, 15, 16, 17]);
    for &i in &kept {
        assert_eq!(flat[i], x[i]);
    }

    // Scale 1 keeps min(1, 0.4 * 2) of its 13 nodes.
    let grown = image.scalewise_napprx(&x, 2.0, 0.4).unwrap();
    let fine_kept = grown[image.scale_range(1)].iter().filter(|&&v| v != 0.0).count();
    assert_eq!(fine_kept, 11);

    let everything = image.scalewise_napprx(&x, 0.0, 1.0).unwrap();
    assert_eq!(everything, x);

    assert_eq!(
        image.scalewise_napprx(&x, 0.0, 1.5).unwrap_err(),
        BlobImageError::InvalidFraction { fraction: 1.5 }
    );
}

#[test]
fn napprx_with_relative_threshold() {
    let image = single_scale_image(1.0, 0.5);
    let mut x = vec![0.1; image.nb_node()];
    x[0] = 10.0;
    x[1] = -9.5;
    let out = image
        .scalewise_napprx_with(&x, 0.0, 0.1, &RelativeThreshold)
        .unwrap();
    assert_eq!(out[0], 10.0);
    assert_eq!(out[1], -9.5);
    assert!(out[2..].iter().all(|&v| v == 0.0));
}

#[test]
fn interscale_products_pair_nearest_nodes() {
    let image = two_scale_image();
    let mut x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    x.extend((0..13).map(|i| 10.0 + i as f64));

    let products = image.interscale_product(&x).unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].len(), 13);
    // Fine nodes (0, -2), (0, 0), (2, 0) and (0, 2) sit on coarse nodes.
    assert_eq!(products[0][0], 10.0 * 1.0);
    assert_eq!(products[0][6], 16.0 * 3.0);
    assert_eq!(products[0][8], 18.0 * 4.0);
    assert_eq!(products[0][12], 22.0 * 5.0);

    let first = image.firstscale_product(&x).unwrap();
    assert_eq!(first, vec![10.0, 2.0 * 14.0, 3.0 * 16.0, 4.0 * 18.0, 5.0 * 22.0]);

    let flat = image.interscale_product_flat(&x).unwrap();
    assert_eq!(flat.len(), 18);
    assert_eq!(&flat[..5], first.as_slice());
    assert_eq!(&flat[5..], products[0].as_slice());

    let single = single_scale_image(1.0, 0.5);
    let y = coefficients(single.nb_node());
    assert_eq!(
        single.interscale_product(&y).unwrap_err(),
        BlobImageError::TooFewScales {
            required: 2,
            actual: 1
        }
    );
    let squares = single.firstscale_product(&y).unwrap();
    for (s, v) in squares.iter().zip(&y) {
        assert_eq!(*s, v * v);
    }
}

#[test]
fn product_masks_select_requested_counts() {
    let image = two_scale_image();
    let x: Vec<f64> = (0..18).map(|i| 1.0 + i as f64).collect();

    let mask = image.prodmask(&x, 0.5).unwrap();
    assert_eq!(mask.len(), 18);
    assert_eq!(mask.iter().filter(|&&m| m).count(), 9);

    let mask = image.scalewise_prodmask(&x, 0.0, 0.4).unwrap();
    assert_eq!(mask.len(), 18);
    assert_eq!(mask[..5].iter().filter(|&&m| m).count(), 2);
    assert_eq!(mask[5..].iter().filter(|&&m| m).count(), 6);

    assert!(matches!(
        image.prodmask(&x, -0.1),
        Err(BlobImageError::InvalidFraction { .. })
    ));
}

#[test]
fn sparsity_counts_near_zero_coefficients() {
    let image = two_scale_image();
    let mut x = vec![0.0; 18];
    x[1] = 2.0;
    x[7] = -1.0;
    x[8] = 1e-20;
    let report = image.sparsity(&x).unwrap();
    assert_eq!(report.scales[0].nodes, 5);
    assert_eq!(report.scales[0].near_zero, 4);
    assert_eq!(report.scales[1].near_zero, 12);
    assert_eq!(report.near_zero(), 16);
    assert!((report.fraction() - 16.0 / 18.0).abs() < 1e-15);
    assert!(report.to_string().contains("total: 16 of 18 near zero"));

    let zeros = image.sparsity(&[0.0; 18]).unwrap();
    assert_eq!(zeros.fraction(), 1.0);
}

#[test]
fn reweighting_mask_inverts_magnitudes() {
    let image = two_scale_image();
    let x = coefficients(18);
    let w = image.reweighting_mask(&x, 0.1).unwrap();
    for (wi, xi) in w.iter().zip(&x) {
        assert!((wi - 1.0 / (xi.abs() + 0.1)).abs() < 1e-15);
        assert!(*wi > 0.0 && *wi <= 10.0);
    }
    assert_eq!(
        image.reweighting_mask(&x, 0.0).unwrap_err(),
        BlobImageError::NonPositiveEpsilon { epsilon: 0.0 }
    );
}

#[test]
fn multipixel_scales_sum_to_full_image() {
    let image = two_scale_image();
    let x = coefficients(18);
    let full = image.blob2pixel(&x, [12, 10]).unwrap();
    let parts = image.blob2multipixel(&x, [12, 10]).unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!((full.rows, full.cols), (12, 10));
    for k in 0..full.data.len() {
        let sum = parts[0].data[k] + parts[1].data[k];
        assert!((full.data[k] - sum).abs() < 1e-12);
    }
    assert!(matches!(
        image.blob2pixel(&x, [0, 4]),
        Err(BlobImageError::InvalidPixelDims { rows: 0, cols: 4 })
    ));
}

#[test]
fn centred_blob_renders_symmetrically() {
    let image = single_scale_image(1.0, 0.5);
    let mut x = vec![0.0; image.nb_node()];
    // Node 6 of the step-1 lattice is the origin.
    x[6] = 1.0;
    let pixels = image.blob2pixel(&x, [8, 8]).unwrap();
    assert!((pixels.get(3, 3) - pixels.get(4, 4)).abs() < 1e-12);
    assert!((pixels.get(3, 4) - pixels.get(4, 3)).abs() < 1e-12);
    assert!(pixels.get(3, 3) > pixels.get(0, 0));

    let [gx, gy] = image.blob2pixelgrad(&x, [8, 8]).unwrap();
    // Left of the centre the image increases with x; above it, decreases with y.
    assert!(gx.get(3, 3) > 0.0 && gx.get(3, 4) < 0.0);
    assert!(gy.get(3, 3) < 0.0 && gy.get(4, 3) > 0.0);
}

#[test]
fn gradient_operator_matches_rendered_gradient() {
    let image = two_scale_image();
    let x = coefficients(18);
    let op = blob_gradient(&image, [9, 7]).unwrap();
    assert_eq!(op.shape_y().sites, 63);
    assert_eq!(op.shape_y().rank, 2);
    let [gx, gy] = image.blob2pixelgrad(&x, [9, 7]).unwrap();
    let applied = op.apply(&x);
    for k in 0..63 {
        assert!((applied[k] - gx.data[k]).abs() < 1e-12);
        assert!((applied[63 + k] - gy.data[k]).abs() < 1e-12);
    }
}

#[test]
fn operators_have_exact_adjoints() {
    let image = two_scale_image();
    assert_adjoint(&blob_interpolator(&image, [10, 10]).unwrap());
    assert_adjoint(&blob_gradient(&image, [10, 10]).unwrap());

    let geometry = ParallelBeam {
        nb_proj: 6,
        pix_det: 11,
        size_det: 6.0,
    };
    let projector = blob_projector(&image, &geometry).unwrap();
    assert_eq!(projector.dim_x(), 18);
    assert_eq!(projector.dim_y(), 66);
    assert_eq!(projector.apply_adjoint(&projector.apply(&coefficients(18))).len(), 18);
    assert_adjoint(&projector);
}

#[test]
fn ridge_warm_start_then_tv_reconstruction() {
    let image = single_scale_image(0.5, 0.35);
    let n = image.nb_node();
    let geometry = ParallelBeam {
        nb_proj: 8,
        pix_det: 24,
        size_det: 6.0,
    };
    let a = blob_projector(&image, &geometry).unwrap();
    let g = blob_gradient(&image, [16, 16]).unwrap();
    let truth: Vec<f64> = (0..n)
        .map(|i| {
            let [x, y] = image.grid(0).node(i);
            if x * x + y * y <= 1.0 {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    let y = a.apply(&truth);

    let mut x = vec![0.0; n];
    let mut ridge = RidgeInitializer::new(&a, Parallelism::None).unwrap();
    ridge.solve(&y, 1e-3, &mut x).unwrap();
    let ridge_res: f64 = a
        .apply(&x)
        .iter()
        .zip(&y)
        .map(|(p, q)| (p - q) * (p - q))
        .sum();
    assert!(ridge_res <= dot(&y, &y));

    let options = TvOptions {
        nonneg: true,
        max_iters: 50,
        ..TvOptions::default()
    };
    let mut solver = TvSolver::new(&a, &g).unwrap();
    let mut nu = vec![0.0; g.dim_y()];
    let report = solver
        .solve(
            &TvProblem::new(&a, &g, &y).with_reference(&truth),
            &mut x,
            &mut nu,
            &mut [],
            &options,
            None,
        )
        .unwrap();
    assert!(report.iterations <= options.max_iters);
    assert!(report.rel_err.len() <= report.iterations);
    assert_eq!(report.snr.len(), report.rel_err.len());
    assert!(x.iter().all(|&v| v.is_finite() && v >= 0.0));
}

use core::fmt;

use std::time::{Duration, Instant};

use crate::linop::{LinOp, OperatorShape};
use crate::metrics::{corr, distance, dot, l2_norm, snr};
use crate::report::{
    emit_line, ConvergenceReport, OuterIterationReport, Reporter, SolveStatus, StdoutReporter,
};
use crate::shrink::{gtv_norm, l1_shrink_into, l2_shrink_into};

/// Halvings tried by the line search before falling back to steepest descent.
const MAX_BACKTRACKS: usize = 10;
/// Decay of the weights in the line-search reference value.
const DELTA: f64 = 0.995;
/// Sufficient-decrease factor of the line search.
const DECREASE: f64 = 1e-3;

/// Errors while constructing the solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// An operator has an empty input or output.
    EmptyOperator { dim_x: usize, dim_a: usize, dim_g: usize },
    /// A and G do not act on the same coefficient space.
    InputMismatch { a_cols: usize, g_cols: usize },
    /// G declares zero components per site.
    ZeroGradRank,
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyOperator {
                dim_x,
                dim_a,
                dim_g,
            } => write!(
                f,
                "empty operator: dim_x={dim_x}, A output={dim_a}, G output={dim_g}"
            ),
            Self::InputMismatch { a_cols, g_cols } => {
                write!(f, "A acts on {a_cols} coefficients but G on {g_cols}")
            }
            Self::ZeroGradRank => write!(f, "gradient operator has rank 0"),
        }
    }
}

impl std::error::Error for SolverError {}

/// Errors specific to a solve call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    /// An argument has the wrong length.
    DimensionMismatch {
        argument: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch {
                argument,
                expected,
                actual,
            } => write!(f, "{argument} length {actual} does not match expected {expected}"),
        }
    }
}

impl std::error::Error for SolveError {}

/// Options controlling the TV solve.
#[derive(Debug, Clone)]
pub struct TvOptions {
    /// Enforce `AX = Y` through the multiplier `Lambda` instead of an L2 fit.
    pub tveq: bool,
    /// Anisotropic (componentwise L1) TV instead of isotropic.
    pub aniso: bool,
    /// Project X onto the non-negative orthant after every step.
    pub nonneg: bool,
    /// Data fidelity penalty.
    pub mu: f64,
    /// Gradient fidelity penalty.
    pub beta: f64,
    /// Multipliers are updated when `||dX|| / ||X||` between passes drops to this.
    pub tol_inner: f64,
    /// Stop when the change between multiplier updates drops to this.
    pub tol_outer: f64,
    /// Hard cap on passes.
    pub max_iters: usize,
    /// Print the parameter banner and a progress table.
    pub verbose: bool,
}

impl Default for TvOptions {
    fn default() -> Self {
        Self {
            tveq: false,
            aniso: false,
            nonneg: false,
            mu: 1.0,
            beta: 1.0,
            tol_inner: 1e-3,
            tol_outer: 1e-4,
            max_iters: 500,
            verbose: false,
        }
    }
}

/// Data of one reconstruction: system operator `a`, gradient operator `g`,
/// measurements `y`, and an optional reference image for diagnostics.
pub struct TvProblem<'a, A: ?Sized, G: ?Sized> {
    pub a: &'a A,
    pub g: &'a G,
    pub y: &'a [f64],
    pub reference: Option<&'a [f64]>,
}

impl<'a, A: LinOp + ?Sized, G: LinOp + ?Sized> TvProblem<'a, A, G> {
    pub fn new(a: &'a A, g: &'a G, y: &'a [f64]) -> Self {
        Self {
            a,
            g,
            y,
            reference: None,
        }
    }

    /// Tracks SNR and correlation against `reference` at every multiplier update.
    pub fn with_reference(mut self, reference: &'a [f64]) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// Total variation minimization by an augmented Lagrangian with alternating
/// directions (TVAL3).
///
/// Minimizes `sum_i ||U_i|| + beta/2 ||GX - U||^2 + mu/2 ||AX - Y||^2` with
/// multiplier updates for `GX = U` (and `AX = Y` in the equality model). X is
/// advanced by one Barzilai-Borwein step per pass, safeguarded by a
/// non-monotone backtracking line search.
///
/// Workspace is sized for one pair of operator shapes at construction and
/// reused across solves.
pub struct TvSolver {
    dim_x: usize,
    shape_a: OperatorShape,
    shape_g: OperatorShape,
    ax: Vec<f64>,
    gx: Vec<f64>,
    u: Vec<f64>,
    shrink_in: Vec<f64>,
    res_a: Vec<f64>,
    res_g: Vec<f64>,
    agrad: Vec<f64>,
    ggrad: Vec<f64>,
    grad: Vec<f64>,
    grad1: Vec<f64>,
    back_a: Vec<f64>,
    x0: Vec<f64>,
    x1: Vec<f64>,
    dx: Vec<f64>,
}

enum ReporterSlot<'a> {
    External(&'a mut dyn Reporter),
    Local(StdoutReporter),
    None,
}

impl<'a> ReporterSlot<'a> {
    fn new(reporter: Option<&'a mut dyn Reporter>, verbose: bool) -> Self {
        match reporter {
            Some(r) => Self::External(r),
            None if verbose => Self::Local(StdoutReporter::new()),
            None => Self::None,
        }
    }

    fn as_mut(&mut self) -> Option<&mut dyn Reporter> {
        match self {
            Self::External(r) => Some(*r),
            Self::Local(r) => Some(r),
            Self::None => None,
        }
    }
}

impl TvSolver {
    /// Create a solver for operators with the shapes of `a` and `g`.
    pub fn new<A, G>(a: &A, g: &G) -> Result<Self, SolverError>
    where
        A: LinOp + ?Sized,
        G: LinOp + ?Sized,
    {
        let dim_x = a.dim_x();
        if dim_x != g.dim_x() {
            return Err(SolverError::InputMismatch {
                a_cols: dim_x,
                g_cols: g.dim_x(),
            });
        }
        let shape_a = a.shape_y();
        let shape_g = g.shape_y();
        if shape_g.rank == 0 {
            return Err(SolverError::ZeroGradRank);
        }
        if dim_x == 0 || shape_a.is_empty() || shape_g.is_empty() {
            return Err(SolverError::EmptyOperator {
                dim_x,
                dim_a: shape_a.len(),
                dim_g: shape_g.len(),
            });
        }

        let m = shape_a.len();
        let k = shape_g.len();
        Ok(Self {
            dim_x,
            shape_a,
            shape_g,
            ax: vec![0.0; m],
            gx: vec![0.0; k],
            u: vec![0.0; k],
            shrink_in: vec![0.0; k],
            res_a: vec![0.0; m],
            res_g: vec![0.0; k],
            agrad: vec![0.0; m],
            ggrad: vec![0.0; k],
            grad: vec![0.0; dim_x],
            grad1: vec![0.0; dim_x],
            back_a: vec![0.0; dim_x],
            x0: vec![0.0; dim_x],
            x1: vec![0.0; dim_x],
            dx: vec![0.0; dim_x],
        })
    }

    /// Auxiliary variable `U ~ GX` of the last solve.
    pub fn auxiliary(&self) -> &[f64] {
        &self.u
    }

    /// Reconstruct in place.
    ///
    /// `x` holds the initial guess and receives the result; `nu` (length of
    /// G's output) and `lambda` (length of A's output, only read and updated
    /// when `tveq` is set) are the multipliers, updated in place.
    pub fn solve<A, G>(
        &mut self,
        problem: &TvProblem<'_, A, G>,
        x: &mut [f64],
        nu: &mut [f64],
        lambda: &mut [f64],
        options: &TvOptions,
        reporter: Option<&mut dyn Reporter>,
    ) -> Result<ConvergenceReport, SolveError>
    where
        A: LinOp + ?Sized,
        G: LinOp + ?Sized,
    {
        self.check_dimensions(problem, x, nu, lambda, options)?;
        let start_time = options.verbose.then(Instant::now);
        if options.verbose {
            print_banner(options);
        }
        let mut reporter = ReporterSlot::new(reporter, options.verbose);

        let TvProblem { a, g, y, reference } = *problem;
        let (mu, beta) = (options.mu, options.beta);
        let rank = self.shape_g.rank;
        let norm_y = l2_norm(y);
        let mut report = ConvergenceReport::new(options.max_iters);

        a.forward(x, &mut self.ax);
        g.forward(x, &mut self.gx);
        self.x0.copy_from_slice(x);
        self.x1.copy_from_slice(x);

        // Non-monotone reference value C with weight P; set on the first pass.
        let mut p = 1.0;
        let mut c = 0.0;
        // A tolerance of 1 or more admits no pass at all.
        let mut rdx_outer = 1.0;
        let mut niter = 0;

        while niter < options.max_iters && rdx_outer > options.tol_outer {
            niter += 1;

            // U-subproblem: shrink GX - Nu / beta.
            for ((v, &gx), &n) in self.shrink_in.iter_mut().zip(&self.gx).zip(nu.iter()) {
                *v = gx - n / beta;
            }
            if options.aniso {
                l1_shrink_into(&self.shrink_in, beta, &mut self.u);
            } else {
                l2_shrink_into(&self.shrink_in, beta, rank, &mut self.u);
            }

            // X-subproblem: one descent step on the augmented Lagrangian.
            self.update_residuals(y, nu, lambda, options);
            a.backward(&self.res_a, &mut self.back_a);
            g.backward(&self.res_g, &mut self.grad);
            for (gr, &b) in self.grad.iter_mut().zip(&self.back_a) {
                *gr = mu * b + beta * *gr;
            }
            let ngrad = dot(&self.grad, &self.grad);
            a.forward(&self.grad, &mut self.agrad);
            g.forward(&self.grad, &mut self.ggrad);
            let steepest = self.steepest_step(ngrad, mu, beta);

            let alpha = if niter == 1 {
                c = self.objective(mu, beta, 0.0);
                steepest
            } else {
                let mut dx_dx = 0.0;
                let mut dx_dgrad = 0.0;
                for ((&d, &gr), &gr1) in self.dx.iter().zip(&self.grad).zip(&self.grad1) {
                    dx_dgrad += d * (gr - gr1);
                    dx_dx += d * d;
                }
                let bb = dx_dx / dx_dgrad;
                if dx_dgrad > 0.0 && bb.is_finite() {
                    bb
                } else {
                    log::debug!("iteration {niter}: degenerate BB step, using steepest descent");
                    report.bb_fallbacks += 1;
                    steepest
                }
            };

            // Non-monotone backtracking along -grad.
            let mut tau = 1.0;
            let mut backtracks = 0;
            let mut val = self.objective(mu, beta, tau * alpha);
            while val > c - DECREASE * tau * alpha * ngrad && backtracks < MAX_BACKTRACKS {
                tau *= 0.5;
                val = self.objective(mu, beta, tau * alpha);
                backtracks += 1;
            }
            let step = if backtracks < MAX_BACKTRACKS {
                tau * alpha
            } else {
                report.line_search_failures += 1;
                if options.verbose {
                    emit_line(&format!(
                        "iteration {niter}: backtracking line search failed, using steepest descent"
                    ));
                } else {
                    log::debug!("iteration {niter}: backtracking line search failed");
                }
                steepest
            };
            for (xi, &gr) in x.iter_mut().zip(&self.grad) {
                *xi -= step * gr;
            }
            if options.nonneg {
                for xi in x.iter_mut() {
                    if *xi < 0.0 {
                        *xi = 0.0;
                    }
                }
            }

            a.forward(x, &mut self.ax);
            g.forward(x, &mut self.gx);
            for ((d, &xi), &x1) in self.dx.iter_mut().zip(x.iter()).zip(&self.x1) {
                *d = xi - x1;
            }

            self.update_residuals(y, nu, lambda, options);
            let val = self.objective(mu, beta, 0.0);
            c = (DELTA * p * c + val) / (DELTA * p + 1.0);
            p = DELTA * p + 1.0;

            let rdx_inner = relative(l2_norm(&self.dx), l2_norm(&self.x1));
            self.x1.copy_from_slice(x);
            std::mem::swap(&mut self.grad, &mut self.grad1);

            if rdx_inner <= options.tol_inner {
                // Multiplier update and outer bookkeeping.
                for ((n, &gx), &u) in nu.iter_mut().zip(&self.gx).zip(&self.u) {
                    *n -= beta * (gx - u);
                }
                if options.tveq {
                    for ((l, &ax), &yi) in lambda.iter_mut().zip(&self.ax).zip(y) {
                        *l -= mu * (ax - yi);
                    }
                }

                rdx_outer = relative(distance(x, &self.x0), l2_norm(&self.x0));
                report.rel_err.push(rdx_outer);
                let (snr_now, corr_now) = match reference {
                    Some(r) => {
                        let (s, cr) = (snr(x, r), corr(x, r));
                        report.snr.push(s);
                        report.corr.push(cr);
                        (Some(s), Some(cr))
                    }
                    None => (None, None),
                };
                self.x0.copy_from_slice(x);

                if let Some(reporter) = reporter.as_mut() {
                    reporter.on_outer_iteration(&OuterIterationReport {
                        iteration: niter,
                        rel_err: rdx_outer,
                        residual: relative(distance(&self.ax, y), norm_y),
                        tv_norm: gtv_norm(&self.gx, rank) / self.shape_g.sites as f64,
                        corr: corr_now,
                        snr: snr_now,
                    });
                }
            }
        }

        report.iterations = niter;
        report.status = if rdx_outer <= options.tol_outer {
            SolveStatus::ConvergedOuter
        } else {
            SolveStatus::MaxIterations
        };
        Ok(finish_report(report, start_time, &mut reporter))
    }

    fn check_dimensions<A, G>(
        &self,
        problem: &TvProblem<'_, A, G>,
        x: &[f64],
        nu: &[f64],
        lambda: &[f64],
        options: &TvOptions,
    ) -> Result<(), SolveError>
    where
        A: LinOp + ?Sized,
        G: LinOp + ?Sized,
    {
        let m = self.shape_a.len();
        let k = self.shape_g.len();
        expect_len("A input", self.dim_x, problem.a.dim_x())?;
        expect_len("A output", m, problem.a.dim_y())?;
        expect_len("G input", self.dim_x, problem.g.dim_x())?;
        expect_len("G output", k, problem.g.dim_y())?;
        expect_len("G rank", self.shape_g.rank, problem.g.shape_y().rank)?;
        expect_len("y", m, problem.y.len())?;
        expect_len("x", self.dim_x, x.len())?;
        expect_len("nu", k, nu.len())?;
        if options.tveq {
            expect_len("lambda", m, lambda.len())?;
        }
        if let Some(reference) = problem.reference {
            expect_len("reference", self.dim_x, reference.len())?;
        }
        Ok(())
    }

    /// `res_a = AX - Y (- Lambda / mu)`, `res_g = GX - U - Nu / beta`.
    fn update_residuals(&mut self, y: &[f64], nu: &[f64], lambda: &[f64], options: &TvOptions) {
        if options.tveq {
            for (((r, &ax), &yi), &l) in self.res_a.iter_mut().zip(&self.ax).zip(y).zip(lambda) {
                *r = ax - yi - l / options.mu;
            }
        } else {
            for ((r, &ax), &yi) in self.res_a.iter_mut().zip(&self.ax).zip(y) {
                *r = ax - yi;
            }
        }
        for (((r, &gx), &u), &n) in self.res_g.iter_mut().zip(&self.gx).zip(&self.u).zip(nu) {
            *r = gx - u - n / options.beta;
        }
    }

    /// Surrogate objective at `X - step * grad`, using the residuals at X.
    fn objective(&self, mu: f64, beta: f64, step: f64) -> f64 {
        let mut fa = 0.0;
        for (&r, &ag) in self.res_a.iter().zip(&self.agrad) {
            let v = r - step * ag;
            fa += v * v;
        }
        let mut fg = 0.0;
        for (&r, &gg) in self.res_g.iter().zip(&self.ggrad) {
            let v = r - step * gg;
            fg += v * v;
        }
        mu / 2.0 * fa + beta / 2.0 * fg
    }

    /// Exact minimizer along -grad of the quadratic surrogate; zero when the
    /// curvature vanishes.
    fn steepest_step(&self, ngrad: f64, mu: f64, beta: f64) -> f64 {
        let curvature = mu * dot(&self.agrad, &self.agrad) + beta * dot(&self.ggrad, &self.ggrad);
        if curvature > 0.0 {
            ngrad / curvature
        } else {
            0.0
        }
    }
}

fn expect_len(argument: &'static str, expected: usize, actual: usize) -> Result<(), SolveError> {
    if expected != actual {
        return Err(SolveError::DimensionMismatch {
            argument,
            expected,
            actual,
        });
    }
    Ok(())
}

/// `num / den`, or `num` itself when `den` is zero.
fn relative(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        num
    }
}

fn print_banner(options: &TvOptions) {
    emit_line("Total variation minimization by augmented Lagrangian (TVAL3)");
    emit_line(&format!("non-negativity: {}", options.nonneg));
    emit_line(&format!("anisotropic TV: {}", options.aniso));
    emit_line(&format!("equality constraint: {}", options.tveq));
    emit_line(&format!("mu: {}, beta: {}", options.mu, options.beta));
    emit_line(&format!(
        "max iterations: {}, tol inner: {}, tol outer: {}",
        options.max_iters, options.tol_inner, options.tol_outer
    ));
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.3} s", secs)
    } else if secs >= 1e-3 {
        format!("{:.3} ms", secs * 1e3)
    } else if secs >= 1e-6 {
        format!("{:.3} us", secs * 1e6)
    } else {
        format!("{:.0} ns", secs * 1e9)
    }
}

fn finish_report(
    report: ConvergenceReport,
    start_time: Option<Instant>,
    reporter: &mut ReporterSlot<'_>,
) -> ConvergenceReport {
    if let Some(reporter) = reporter.as_mut() {
        reporter.on_finish();
    }
    if let Some(start) = start_time {
        let elapsed = format_duration(start.elapsed());
        emit_line(&format!(
            "{:?} after {} iterations, time: {elapsed}",
            report.status, report.iterations
        ));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linop::{FiniteDifference, Identity};

    #[test]
    fn denoises_constant_signal_exactly() {
        let a = Identity::new(8);
        let g = FiniteDifference::line(8);
        let y = vec![2.0; 8];
        let mut solver = TvSolver::new(&a, &g).unwrap();
        let mut x = vec![2.0; 8];
        let mut nu = vec![0.0; 8];
        let report = solver
            .solve(
                &TvProblem::new(&a, &g, &y),
                &mut x,
                &mut nu,
                &mut [],
                &TvOptions::default(),
                None,
            )
            .unwrap();
        assert!(report.converged());
        assert_eq!(report.iterations, 1);
        assert!(x.iter().all(|&v| (v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn rejects_mismatched_operators() {
        let err = TvSolver::new(&Identity::new(4), &FiniteDifference::line(5)).err();
        assert_eq!(err, Some(SolverError::InputMismatch { a_cols: 4, g_cols: 5 }));
    }

    #[test]
    fn relative_change_falls_back_to_absolute() {
        assert_eq!(relative(3.0, 0.0), 3.0);
        assert_eq!(relative(3.0, 2.0), 1.5);
    }
}

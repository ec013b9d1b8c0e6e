use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Outer relative change fell below `tol_outer`.
    ConvergedOuter,
    /// `max_iters` passes were run.
    MaxIterations,
}

/// Convergence record of one TV solve.
///
/// `rel_err` holds one entry per multiplier update; `snr` and `corr` are
/// filled in parallel only when a reference image was supplied.
#[derive(Debug, Clone)]
pub struct ConvergenceReport {
    pub status: SolveStatus,
    pub iterations: usize,
    pub rel_err: Vec<f64>,
    pub snr: Vec<f64>,
    pub corr: Vec<f64>,
    /// Iterations whose backtracking exhausted its halvings.
    pub line_search_failures: usize,
    /// Iterations where the BB step was replaced by steepest descent.
    pub bb_fallbacks: usize,
}

impl ConvergenceReport {
    pub(crate) fn new(max_iters: usize) -> Self {
        // One multiplier update per pass at most; cap the reservation.
        let capacity = max_iters.min(1024);
        Self {
            status: SolveStatus::MaxIterations,
            iterations: 0,
            rel_err: Vec::with_capacity(capacity),
            snr: Vec::new(),
            corr: Vec::new(),
            line_search_failures: 0,
            bb_fallbacks: 0,
        }
    }

    /// Number of multiplier-update events.
    pub fn outer_iterations(&self) -> usize {
        self.rel_err.len()
    }

    pub fn converged(&self) -> bool {
        self.status == SolveStatus::ConvergedOuter
    }
}

/// Progress row produced at each multiplier update.
#[derive(Debug, Clone)]
pub struct OuterIterationReport {
    pub iteration: usize,
    pub rel_err: f64,
    /// `||AX - Y|| / ||Y||`.
    pub residual: f64,
    /// `GTVNorm(GX) / sites`.
    pub tv_norm: f64,
    pub corr: Option<f64>,
    pub snr: Option<f64>,
}

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

pub trait Reporter {
    fn on_outer_iteration(&mut self, report: &OuterIterationReport);
    fn on_finish(&mut self) {}
}

/// Collects progress rows and prints them as one table when the solve ends.
pub struct StdoutReporter {
    rows: Vec<OuterIterationReport>,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn optional(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

impl Reporter for StdoutReporter {
    fn on_outer_iteration(&mut self, report: &OuterIterationReport) {
        self.rows.push(report.clone());
    }

    fn on_finish(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        if !log::log_enabled!(log::Level::Info) {
            println!();
        }
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("iter").set_alignment(CellAlignment::Right),
            Cell::new("tol_out").set_alignment(CellAlignment::Right),
            Cell::new("corr").set_alignment(CellAlignment::Right),
            Cell::new("snr").set_alignment(CellAlignment::Right),
            Cell::new("res").set_alignment(CellAlignment::Right),
            Cell::new("tv").set_alignment(CellAlignment::Right),
        ]);
        for row in &self.rows {
            table.add_row(vec![
                Cell::new(row.iteration).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.5}", row.rel_err)).set_alignment(CellAlignment::Right),
                Cell::new(optional(row.corr, 5)).set_alignment(CellAlignment::Right),
                Cell::new(optional(row.snr, 3)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.5}", row.residual)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.4e}", row.tv_norm)).set_alignment(CellAlignment::Right),
            ]);
        }

        for line in table.to_string().lines() {
            emit_line(line);
        }
        self.rows.clear();
    }
}

//! Focus-curve solving over a collected sweep.
//!
//! Consumes the full set of per-frame sharpness samples once, fits the
//! configured model by weighted least squares, and classifies the result
//! into one of three terminal outcomes. A fit that completed but failed a
//! validity check still carries its full report, so callers can inspect a
//! rejected curve without being able to mistake it for a clean answer.

pub mod model;

use log::{info, warn};

use crate::config::{ModelFamily, SolverConfig};
use crate::error::SolveError;
use crate::extract::FocusSample;
use crate::stats;

pub use model::{CurveModel, FitFailure, OptimizerSettings};

/// Why a completed fit was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The fitted curve has zero or negative curvature at its optimum: a
    /// maximum or saddle, not a focus minimum.
    NonPositiveCurvature,
    /// The fitted optimum lies further outside the sampled focus span than
    /// the extrapolation allowance permits; the sweep never bracketed it.
    OptimumOutsideSampledRange,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NonPositiveCurvature => write!(f, "non-positive curvature at optimum"),
            RejectReason::OptimumOutsideSampledRange => {
                write!(f, "optimum outside sampled focus range")
            }
        }
    }
}

/// Diagnostics of the fitted curve itself.
#[derive(Debug, Clone)]
pub struct FocusCurveFit {
    /// Model family that was fit.
    pub model: ModelFamily,
    /// Fitted coefficients, lowest order first.
    pub coefficients: Vec<f64>,
    /// Location of the fitted optimum.
    pub best_focus: f64,
    /// Model value at the optimum.
    pub sharpness_at_best: f64,
    /// Weighted chi-squared per degree of freedom; zero when the fit has
    /// no free degrees (sample count equals coefficient count).
    pub reduced_chi_squared: f64,
    /// Weighted coefficient of determination.
    pub r_squared: f64,
}

/// Accepted (or rejected-with-diagnostics) best-focus answer.
#[derive(Debug, Clone)]
pub struct FocusReport {
    /// Best focus position, in sweep units.
    pub best_focus: f64,
    /// One-sigma uncertainty on the best focus position.
    pub best_focus_uncertainty: f64,
    /// Whether the optimum lies within the sampled position span (as
    /// opposed to the permitted extrapolation margin outside it).
    pub inside_sampled_range: bool,
    /// Samples that survived filtering and entered the fit.
    pub samples_used: usize,
    /// Full curve diagnostics.
    pub fit: FocusCurveFit,
}

/// Terminal state of a solve.
///
/// Callers must match on this; there is no accessor that yields a best
/// focus without passing through the classification.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    /// The fit converged and passed all validity checks.
    Success(FocusReport),
    /// The fit converged but failed a validity check; the report is
    /// attached for diagnostics.
    Rejected {
        /// Which check failed.
        reason: RejectReason,
        /// Diagnostics of the rejected fit.
        report: FocusReport,
    },
    /// No usable fit was produced at all.
    ConvergenceFailed {
        /// Model family that was attempted.
        model: ModelFamily,
        /// What went wrong.
        failure: FitFailure,
    },
}

impl SolveOutcome {
    /// Best focus if and only if the outcome is `Success`.
    pub fn best_focus(&self) -> Option<f64> {
        match self {
            SolveOutcome::Success(report) => Some(report.best_focus),
            _ => None,
        }
    }
}

/// Fit the focus curve and classify the result.
///
/// Samples with too little source support or non-finite fields are dropped
/// before fitting; the fit weights each survivor by `1/uncertainty^2`
/// (unit weight where the uncertainty is zero). Repeated focus positions
/// are legitimate repeat measurements and all retained.
///
/// # Errors
///
/// [`SolveError::InsufficientSamples`] when fewer samples survive than the
/// larger of `min_samples_for_fit` and the model's own minimum. This is the
/// only `Err`: once a fit is attempted, failure is expressed through
/// [`SolveOutcome`].
pub fn solve(samples: &[FocusSample], config: &SolverConfig) -> Result<SolveOutcome, SolveError> {
    let usable: Vec<&FocusSample> = samples
        .iter()
        .filter(|s| {
            s.focus_position.is_finite()
                && s.sharpness.is_finite()
                && s.uncertainty.is_finite()
                && s.source_count >= config.min_source_support
        })
        .collect();

    let family = config.model_family;
    let needed = config.min_samples_for_fit.max(model::min_samples(family));
    if usable.len() < needed {
        return Err(SolveError::InsufficientSamples {
            found: usable.len(),
            needed,
            model: family.name(),
        });
    }

    let x: Vec<f64> = usable.iter().map(|s| s.focus_position).collect();
    let y: Vec<f64> = usable.iter().map(|s| s.sharpness).collect();
    let w: Vec<f64> = usable
        .iter()
        .map(|s| {
            if s.uncertainty > 0.0 {
                1.0 / (s.uncertainty * s.uncertainty)
            } else {
                1.0
            }
        })
        .collect();

    let x_min = x.iter().copied().fold(f64::INFINITY, f64::min);
    let x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let margin = config.max_extrapolation_factor * (x_max - x_min);

    // The iterative minimizer searches the sampled span only: a polynomial
    // is constrained by data there and can do anything beyond it.
    let optimizer = OptimizerSettings {
        lower: x_min,
        upper: x_max,
        max_iterations: config.optimizer_max_iterations,
        tolerance: config.optimizer_tolerance,
    };

    let fitted = match model::fit(family, &x, &y, &w, &optimizer) {
        Ok(m) => m,
        Err(failure) => {
            warn!("{} fit failed to converge: {failure:?}", family.name());
            return Ok(SolveOutcome::ConvergenceFailed {
                model: family,
                failure,
            });
        }
    };

    let report = build_report(&*fitted, &usable, &x, &y, &w, (x_min, x_max));

    // Validity checks, cheapest disqualifier first.
    let best = report.best_focus;
    if !best.is_finite() || fitted.curvature(best) <= 0.0 {
        warn!(
            "rejecting {} fit: non-positive curvature at optimum {best:.3}",
            family.name()
        );
        return Ok(SolveOutcome::Rejected {
            reason: RejectReason::NonPositiveCurvature,
            report,
        });
    }

    // A bounded search that converged onto a window edge means the curve
    // keeps improving beyond the sweep: unbracketed, same as an analytic
    // vertex landing outside the allowed span.
    if fitted.optimum_at_search_bound() || best < x_min - margin || best > x_max + margin {
        warn!(
            "rejecting {} fit: optimum {best:.3} outside sampled range [{x_min:.3}, {x_max:.3}] \
             (margin {margin:.3})",
            family.name()
        );
        return Ok(SolveOutcome::Rejected {
            reason: RejectReason::OptimumOutsideSampledRange,
            report,
        });
    }

    info!(
        "best focus {best:.3} +- {:.3} from {} samples ({}, r^2 {:.4})",
        report.best_focus_uncertainty,
        report.samples_used,
        family.name(),
        report.fit.r_squared
    );
    Ok(SolveOutcome::Success(report))
}

fn build_report(
    fitted: &dyn CurveModel,
    usable: &[&FocusSample],
    x: &[f64],
    y: &[f64],
    w: &[f64],
    span: (f64, f64),
) -> FocusReport {
    let n = x.len();
    let coefficients = fitted.coefficients();

    let chi_squared: f64 = (0..n)
        .map(|i| {
            let r = y[i] - fitted.evaluate(x[i]);
            w[i] * r * r
        })
        .sum();
    let dof = n.saturating_sub(coefficients.len());
    let reduced_chi_squared = if dof > 0 { chi_squared / dof as f64 } else { 0.0 };

    let w_sum: f64 = w.iter().sum();
    let y_mean = (0..n).map(|i| w[i] * y[i]).sum::<f64>() / w_sum;
    let ss_tot: f64 = (0..n).map(|i| w[i] * (y[i] - y_mean) * (y[i] - y_mean)).sum();
    let r_squared = if ss_tot > 0.0 {
        1.0 - chi_squared / ss_tot
    } else {
        1.0
    };

    let uncertainties: Vec<f64> = usable.iter().map(|s| s.uncertainty).collect();
    let median_uncertainty = stats::median(&uncertainties).unwrap_or(0.0);

    let best_focus = fitted.optimum();
    FocusReport {
        best_focus,
        best_focus_uncertainty: fitted.optimum_uncertainty(reduced_chi_squared, median_uncertainty),
        inside_sampled_range: best_focus >= span.0
            && best_focus <= span.1
            && !fitted.optimum_at_search_bound(),
        samples_used: n,
        fit: FocusCurveFit {
            model: fitted.family(),
            coefficients,
            best_focus,
            sharpness_at_best: fitted.evaluate(best_focus),
            reduced_chi_squared,
            r_squared,
        },
    }
}

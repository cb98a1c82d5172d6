//! Focus-curve models and their weighted least-squares fits.
//!
//! Two model families over a closed set (see
//! [`ModelFamily`](crate::config::ModelFamily)): a quadratic with a
//! closed-form fit and analytic vertex, and a quartic polynomial for
//! asymmetric focus curves whose minimum is found by bounded golden-section
//! search. Both fit with weights `1/uncertainty^2`.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::config::ModelFamily;

/// Golden ratio conjugate, (sqrt(5) - 1) / 2.
const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Why a fit could not produce a usable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitFailure {
    /// Normal equations singular or coefficients non-finite (e.g. all
    /// samples at one focus position).
    Degenerate,
    /// The bounded minimizer hit its iteration cap before reaching the
    /// requested tolerance.
    BudgetExhausted {
        /// Iterations spent before giving up.
        iterations: usize,
    },
}

/// A fitted focus curve.
///
/// Implementations are produced by [`fit`]; the solver consumes them
/// through this interface only.
pub trait CurveModel {
    /// Family this model belongs to.
    fn family(&self) -> ModelFamily;
    /// Fitted coefficients, lowest order first.
    fn coefficients(&self) -> Vec<f64>;
    /// Model value at `x`.
    fn evaluate(&self, x: f64) -> f64;
    /// Location of the fitted optimum.
    fn optimum(&self) -> f64;
    /// Whether a bounded search left the optimum pinned against a search
    /// window edge. The curve keeps improving past the sampled span there,
    /// so the sweep never bracketed the real optimum. Always false for
    /// models with a closed-form optimum.
    fn optimum_at_search_bound(&self) -> bool {
        false
    }
    /// Second derivative at `x`; positive at a minimum.
    fn curvature(&self, x: f64) -> f64;
    /// One-sigma uncertainty on the optimum location.
    ///
    /// `reduced_chi_squared` rescales covariance-based estimates when the
    /// sample uncertainties were mis-stated; `median_uncertainty` feeds the
    /// curvature-based fallback for models without an analytic vertex.
    fn optimum_uncertainty(&self, reduced_chi_squared: f64, median_uncertainty: f64) -> f64;
}

/// Search bounds and budget for the iterative minimizer.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerSettings {
    /// Lower edge of the search window.
    pub lower: f64,
    /// Upper edge of the search window.
    pub upper: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Interval width at which the search is considered converged, in
    /// focus units.
    pub tolerance: f64,
}

/// Fit the selected model family to weighted samples.
///
/// `x` are focus positions, `y` sharpness values, `w` the per-sample
/// weights. The optimizer settings only matter for families without a
/// closed-form optimum.
pub fn fit(
    family: ModelFamily,
    x: &[f64],
    y: &[f64],
    w: &[f64],
    optimizer: &OptimizerSettings,
) -> Result<Box<dyn CurveModel>, FitFailure> {
    match family {
        ModelFamily::Quadratic => Ok(Box::new(QuadraticModel::fit(x, y, w)?)),
        ModelFamily::Asymmetric => Ok(Box::new(QuarticModel::fit(x, y, w, optimizer)?)),
    }
}

/// Minimum samples the family needs for a non-degenerate fit.
pub fn min_samples(family: ModelFamily) -> usize {
    match family {
        ModelFamily::Quadratic => 3,
        ModelFamily::Asymmetric => 5,
    }
}

/// Weighted quadratic `c0 + c1 x + c2 x^2` with analytic vertex.
#[derive(Debug, Clone)]
pub struct QuadraticModel {
    coeffs: [f64; 3],
    /// Inverse of the weighted normal matrix (unscaled covariance).
    covariance: Matrix3<f64>,
}

impl QuadraticModel {
    fn fit(x: &[f64], y: &[f64], w: &[f64]) -> Result<Self, FitFailure> {
        // Weighted power sums for the 3x3 normal equations.
        let mut s = [0.0f64; 5];
        let mut b = Vector3::zeros();
        for i in 0..x.len() {
            let mut xp = 1.0;
            for (k, sk) in s.iter_mut().enumerate() {
                *sk += w[i] * xp;
                if k < 3 {
                    b[k] += w[i] * xp * y[i];
                }
                xp *= x[i];
            }
        }

        let normal = Matrix3::new(
            s[0], s[1], s[2], //
            s[1], s[2], s[3], //
            s[2], s[3], s[4],
        );

        let inverse = normal.try_inverse().ok_or(FitFailure::Degenerate)?;
        let c = inverse * b;
        if !c.iter().all(|v| v.is_finite()) {
            return Err(FitFailure::Degenerate);
        }

        Ok(Self {
            coeffs: [c[0], c[1], c[2]],
            covariance: inverse,
        })
    }
}

impl CurveModel for QuadraticModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Quadratic
    }

    fn coefficients(&self) -> Vec<f64> {
        self.coeffs.to_vec()
    }

    fn evaluate(&self, x: f64) -> f64 {
        self.coeffs[0] + self.coeffs[1] * x + self.coeffs[2] * x * x
    }

    fn optimum(&self) -> f64 {
        // Vertex; for c2 == 0 this is +-inf and fails the validity checks
        // downstream rather than panicking here.
        -self.coeffs[1] / (2.0 * self.coeffs[2])
    }

    fn curvature(&self, _x: f64) -> f64 {
        2.0 * self.coeffs[2]
    }

    fn optimum_uncertainty(&self, reduced_chi_squared: f64, _median_uncertainty: f64) -> f64 {
        // Propagate the (scaled) parameter covariance through the vertex
        // x* = -c1 / (2 c2): gradient is (0, -1/(2 c2), c1/(2 c2^2)).
        let c1 = self.coeffs[1];
        let c2 = self.coeffs[2];
        if c2 == 0.0 {
            return f64::INFINITY;
        }
        let g = Vector3::new(0.0, -1.0 / (2.0 * c2), c1 / (2.0 * c2 * c2));
        let scale = if reduced_chi_squared > 1.0 {
            reduced_chi_squared
        } else {
            1.0
        };
        let variance = (g.transpose() * (self.covariance * scale) * g)[(0, 0)];
        variance.max(0.0).sqrt()
    }
}

/// Weighted quartic polynomial with a golden-section minimum.
#[derive(Debug, Clone)]
pub struct QuarticModel {
    coeffs: [f64; 5],
    optimum: f64,
    pinned_at_bound: bool,
}

impl QuarticModel {
    fn fit(x: &[f64], y: &[f64], w: &[f64], optimizer: &OptimizerSettings) -> Result<Self, FitFailure> {
        let n = x.len();
        // sqrt(w)-scaled Vandermonde system solved by normal equations.
        let mut design = DMatrix::zeros(n, 5);
        let mut rhs = DVector::zeros(n);
        for i in 0..n {
            let sw = w[i].sqrt();
            let mut xp = 1.0;
            for k in 0..5 {
                design[(i, k)] = sw * xp;
                xp *= x[i];
            }
            rhs[i] = sw * y[i];
        }

        let normal = design.transpose() * &design;
        let b = design.transpose() * rhs;
        let c = normal.lu().solve(&b).ok_or(FitFailure::Degenerate)?;
        if !c.iter().all(|v| v.is_finite()) {
            return Err(FitFailure::Degenerate);
        }
        let coeffs = [c[0], c[1], c[2], c[3], c[4]];

        let eval = |x: f64| {
            coeffs
                .iter()
                .rev()
                .fold(0.0, |acc: f64, &coeff| acc * x + coeff)
        };
        let optimum = golden_section_min(eval, optimizer)?;
        // The final bracket is at most `tolerance` wide, so a minimum that
        // sits on a window edge converges within that distance of it.
        let pinned_at_bound = optimum - optimizer.lower <= optimizer.tolerance
            || optimizer.upper - optimum <= optimizer.tolerance;

        Ok(Self {
            coeffs,
            optimum,
            pinned_at_bound,
        })
    }
}

impl CurveModel for QuarticModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Asymmetric
    }

    fn coefficients(&self) -> Vec<f64> {
        self.coeffs.to_vec()
    }

    fn evaluate(&self, x: f64) -> f64 {
        self.coeffs
            .iter()
            .rev()
            .fold(0.0, |acc, &coeff| acc * x + coeff)
    }

    fn optimum(&self) -> f64 {
        self.optimum
    }

    fn optimum_at_search_bound(&self) -> bool {
        self.pinned_at_bound
    }

    fn curvature(&self, x: f64) -> f64 {
        2.0 * self.coeffs[2] + 6.0 * self.coeffs[3] * x + 12.0 * self.coeffs[4] * x * x
    }

    fn optimum_uncertainty(&self, _reduced_chi_squared: f64, median_uncertainty: f64) -> f64 {
        // Half-width over which the curve rises by one median sample
        // uncertainty: 0.5 k dx^2 = u  =>  dx = sqrt(2u / k).
        let k = self.curvature(self.optimum);
        if k <= 0.0 || median_uncertainty <= 0.0 {
            return f64::INFINITY;
        }
        (2.0 * median_uncertainty / k).sqrt()
    }
}

/// Bounded golden-section minimization of a unimodal function.
///
/// Converges when the bracketing interval is narrower than the tolerance;
/// hitting the iteration cap first is [`FitFailure::BudgetExhausted`].
fn golden_section_min<F: Fn(f64) -> f64>(
    f: F,
    settings: &OptimizerSettings,
) -> Result<f64, FitFailure> {
    let mut a = settings.lower;
    let mut b = settings.upper;
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    let mut iterations = 0;
    while (b - a).abs() > settings.tolerance {
        if iterations >= settings.max_iterations {
            return Err(FitFailure::BudgetExhausted { iterations });
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d);
        }
        iterations += 1;
    }

    Ok((a + b) / 2.0)
}

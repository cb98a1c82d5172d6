use serde::{Deserialize, Serialize};

/// Focus-curve model family.
///
/// A closed set: the solver dispatches over these variants rather than
/// accepting arbitrary model implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Weighted quadratic; closed-form fit, analytic vertex. The default.
    #[default]
    Quadratic,
    /// Weighted quartic polynomial for skewed focus curves; optimum found
    /// by bounded iterative minimization.
    Asymmetric,
}

impl ModelFamily {
    /// Short name used in log messages and errors.
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::Quadratic => "quadratic",
            ModelFamily::Asymmetric => "asymmetric",
        }
    }
}

/// Per-image source extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Detection threshold above background, in units of background noise sigma.
    pub detection_threshold_sigma: f64,
    /// Minimum surviving sources for a frame to contribute a sample.
    pub min_sources_per_image: usize,
    /// Minimum connected-component area in pixels (rejects hot pixels).
    pub min_source_area: usize,
    /// Maximum moment-based aspect ratio; rejects elongated artifacts and blends.
    pub max_aspect_ratio: f64,
    /// Pixel value at or above which a source counts as saturated (DN).
    pub saturation_value: f64,
    /// Sources whose bounding box comes within this many pixels of the
    /// region border are rejected (truncated profiles bias the width).
    pub edge_margin: usize,
    /// Kappa for background sigma clipping.
    pub background_clip_sigma: f64,
    /// Maximum background clipping iterations.
    pub background_clip_iterations: usize,
    /// Kappa for the single-pass clip of per-source widths before reduction.
    pub width_clip_sigma: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            detection_threshold_sigma: 3.0,
            min_sources_per_image: 3,
            min_source_area: 5,
            max_aspect_ratio: 2.5,
            saturation_value: 65535.0,
            edge_margin: 4,
            background_clip_sigma: 3.0,
            background_clip_iterations: 5,
            width_clip_sigma: 3.0,
        }
    }
}

/// Focus-curve fitting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Model family to fit.
    pub model_family: ModelFamily,
    /// Minimum usable samples before a fit is attempted. The effective
    /// minimum is the larger of this and the model's own requirement.
    pub min_samples_for_fit: usize,
    /// Samples backed by fewer valid sources than this are dropped.
    pub min_source_support: usize,
    /// A fitted optimum further outside the sampled span than this fraction
    /// of the span is rejected as unbracketed.
    pub max_extrapolation_factor: f64,
    /// Iteration cap for the bounded minimizer (nonlinear models only).
    pub optimizer_max_iterations: usize,
    /// Convergence tolerance for the bounded minimizer, in focus units.
    pub optimizer_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            model_family: ModelFamily::Quadratic,
            min_samples_for_fit: 3,
            min_source_support: 3,
            max_extrapolation_factor: 0.2,
            optimizer_max_iterations: 100,
            optimizer_tolerance: 1e-6,
        }
    }
}

/// Top-level configuration for a focus run.
///
/// Passed explicitly into each call; the crate keeps no process-wide state,
/// so independent sweeps (e.g. different instruments) can run concurrently
/// with different settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FocusConfig {
    /// Per-image extraction settings.
    pub extraction: ExtractionConfig,
    /// Curve fitting settings.
    pub solver: SolverConfig,
    /// Worker threads for frame-parallel extraction. `None` uses the
    /// global rayon pool.
    pub worker_count: Option<usize>,
}

use thiserror::Error;

/// Errors from per-image feature extraction.
///
/// These are per-frame failures: the batch layer logs them and drops the
/// frame rather than aborting the sweep.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Too few usable sources survived detection and filtering.
    #[error("insufficient sources: found {found}, need at least {needed}")]
    InsufficientSources {
        /// Number of sources that passed all filters.
        found: usize,
        /// Configured minimum per image.
        needed: usize,
    },

    /// A region (ROI or component footprint) holds no usable pixels.
    #[error("no usable pixels in {height}x{width} region")]
    EmptyRegion {
        /// Region height in pixels.
        height: usize,
        /// Region width in pixels.
        width: usize,
    },

    /// Statistic computation failed (e.g. all widths were NaN).
    #[error("stats computation failed: {0}")]
    Stats(#[from] crate::stats::StatsError),
}

/// Errors from the focus solver.
///
/// Solver failures are batch-fatal: there is no meaningful partial answer.
/// Note that convergence failure and validity rejection are *not* errors,
/// they are [`SolveOutcome`](crate::solve::SolveOutcome) variants, since a
/// fit was attempted and its diagnostics are worth reporting.
#[derive(Error, Debug)]
pub enum SolveError {
    /// Fewer valid samples than the fitted model requires.
    #[error("insufficient samples for {model} fit: found {found}, need at least {needed}")]
    InsufficientSamples {
        /// Number of samples surviving the support filter.
        found: usize,
        /// Effective minimum for the selected model.
        needed: usize,
        /// Model family name for context.
        model: &'static str,
    },
}

//! Sigma-clipped background and noise estimation.
//!
//! Source detection thresholds are expressed in units of background noise
//! sigma, so both the level and the noise must be estimated robustly:
//! stars themselves sit in the pixel distribution and would bias a plain
//! mean/stddev. Iterative kappa-sigma clipping rejects source pixels, and
//! the noise sigma is MAD-based for the same reason.

use ndarray::ArrayView2;

use crate::stats::{sigma_clipped_stats, StatsError};

/// Robust background statistics for a region.
#[derive(Debug, Clone)]
pub struct BackgroundEstimate {
    /// Background level (clipped median) in image units.
    pub level: f64,
    /// Background noise sigma (MAD-based) in image units.
    pub noise_sigma: f64,
    /// Number of pixels that survived clipping.
    pub n_pixels: usize,
}

impl BackgroundEstimate {
    /// Detection threshold at `threshold_sigma` sigmas above background.
    pub fn threshold(&self, threshold_sigma: f64) -> f64 {
        self.level + threshold_sigma * self.noise_sigma
    }
}

/// Estimate background level and noise over a region.
///
/// # Arguments
/// * `region` - Pixel values (full frame or ROI view)
/// * `kappa` - Clip threshold in sigmas (typical: 3.0)
/// * `iterations` - Maximum clipping passes (typical: 5)
///
/// # Errors
///
/// [`StatsError::Empty`] if the region has no finite pixels.
pub fn estimate_background(
    region: &ArrayView2<f64>,
    kappa: f64,
    iterations: usize,
) -> Result<BackgroundEstimate, StatsError> {
    let pixels: Vec<f64> = region.iter().copied().collect();
    let stats = sigma_clipped_stats(&pixels, kappa, iterations)?;

    Ok(BackgroundEstimate {
        level: stats.median,
        noise_sigma: stats.sigma,
        n_pixels: stats.n_used,
    })
}

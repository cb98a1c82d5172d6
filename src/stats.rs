//! Robust statistics for background estimation and width reduction.
//!
//! All estimators here are median-based so that residual outliers (cosmic
//! rays, blends that slipped past the shape filters) cannot drag the
//! per-image sharpness statistic.

use thiserror::Error;

/// Conversion factor from median absolute deviation to Gaussian sigma.
pub const MAD_TO_SIGMA: f64 = 1.4826;

/// Asymptotic efficiency factor for the standard error of the median,
/// sqrt(pi / 2).
pub const MEDIAN_SE_FACTOR: f64 = 1.2533;

/// Errors from statistic computations on degenerate inputs.
#[derive(Error, Debug)]
pub enum StatsError {
    /// No finite values remained after filtering NaN.
    #[error("insufficient data points: {total} total values, 0 usable")]
    Empty {
        /// Number of values in the original input.
        total: usize,
    },
}

/// Result of iterative kappa-sigma clipping over a set of values.
#[derive(Debug, Clone)]
pub struct ClippedStats {
    /// Median of the surviving values.
    pub median: f64,
    /// Mean of the surviving values.
    pub mean: f64,
    /// Robust sigma of the surviving values (MAD-based).
    pub sigma: f64,
    /// Number of values that survived clipping.
    pub n_used: usize,
}

/// Calculate the median of a slice, ignoring NaN values.
///
/// Infinite values are kept and sort to the extremes. For even-length data
/// the average of the two middle values is returned.
///
/// # Errors
///
/// [`StatsError::Empty`] if no finite-or-infinite values remain.
pub fn median(values: &[f64]) -> Result<f64, StatsError> {
    let mut valid: Vec<f64> = values.iter().filter(|v| !v.is_nan()).copied().collect();

    if valid.is_empty() {
        return Err(StatsError::Empty {
            total: values.len(),
        });
    }

    valid.sort_by(|a, b| a.partial_cmp(b).expect("NaN filtered above"));

    let mid = valid.len() / 2;
    let m = if valid.len() % 2 == 0 {
        (valid[mid - 1] + valid[mid]) / 2.0
    } else {
        valid[mid]
    };

    Ok(m)
}

/// Median absolute deviation about the median.
pub fn median_abs_deviation(values: &[f64]) -> Result<f64, StatsError> {
    let center = median(values)?;
    let deviations: Vec<f64> = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|&v| (v - center).abs())
        .collect();
    median(&deviations)
}

/// Iterative kappa-sigma clipping.
///
/// Repeatedly rejects values further than `kappa` robust sigmas from the
/// running median, up to `iterations` passes or until no value is rejected.
/// The sigma used for clipping and reported in the result is MAD-based
/// (sigma = 1.4826 x MAD), so a single bright source cannot inflate the
/// clip envelope.
///
/// # Arguments
/// * `values` - Input values; NaN entries are dropped before the first pass
/// * `kappa` - Clip threshold in sigmas (typical: 3.0)
/// * `iterations` - Maximum clipping passes (typical: 5)
pub fn sigma_clipped_stats(
    values: &[f64],
    kappa: f64,
    iterations: usize,
) -> Result<ClippedStats, StatsError> {
    let mut kept: Vec<f64> = values.iter().filter(|v| v.is_finite()).copied().collect();

    if kept.is_empty() {
        return Err(StatsError::Empty {
            total: values.len(),
        });
    }

    let mut center = median(&kept)?;
    let mut sigma = MAD_TO_SIGMA * median_abs_deviation(&kept)?;

    for _ in 0..iterations {
        if sigma <= 0.0 {
            // All survivors identical; nothing left to clip.
            break;
        }

        let before = kept.len();
        kept.retain(|&v| (v - center).abs() <= kappa * sigma);

        if kept.is_empty() {
            // Clip envelope collapsed; fall back to the last non-empty set.
            return Err(StatsError::Empty {
                total: values.len(),
            });
        }

        center = median(&kept)?;
        sigma = MAD_TO_SIGMA * median_abs_deviation(&kept)?;

        if kept.len() == before {
            break;
        }
    }

    let mean = kept.iter().sum::<f64>() / kept.len() as f64;

    Ok(ClippedStats {
        median: center,
        mean,
        sigma,
        n_used: kept.len(),
    })
}

/// Standard error of the median for a sample with robust sigma `sigma`.
///
/// Uses the large-sample approximation `1.2533 * sigma / sqrt(n)`. Returns
/// zero for a single-element sample, where no spread is measurable.
pub fn median_standard_error(sigma: f64, n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    MEDIAN_SE_FACTOR * sigma / (n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_length() {
        assert_eq!(median(&[1.0, 3.0, 2.0, 5.0, 4.0]).unwrap(), 3.0);
    }

    #[test]
    fn test_median_even_length() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_median_ignores_nan() {
        assert_eq!(median(&[1.0, f64::NAN, 3.0, 2.0, f64::NAN]).unwrap(), 2.0);
    }

    #[test]
    fn test_median_all_nan() {
        assert!(matches!(
            median(&[f64::NAN, f64::NAN]),
            Err(StatsError::Empty { total: 2 })
        ));
    }

    #[test]
    fn test_median_empty() {
        assert!(median(&[]).is_err());
    }

    #[test]
    fn test_mad_constant_data() {
        assert_eq!(median_abs_deviation(&[4.0, 4.0, 4.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_mad_known_value() {
        // Deviations from median 3: [2, 1, 0, 1, 2] -> MAD 1
        let mad = median_abs_deviation(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_relative_eq!(mad, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sigma_clip_rejects_outlier() {
        // Tight cluster plus one wild value; clipping should remove it.
        let mut values = vec![10.0, 10.1, 9.9, 10.05, 9.95, 10.02, 9.98];
        values.push(50.0);

        let stats = sigma_clipped_stats(&values, 3.0, 5).unwrap();
        assert_eq!(stats.n_used, 7);
        assert_relative_eq!(stats.median, 10.0, epsilon = 0.1);
        assert!(stats.sigma < 0.5);
    }

    #[test]
    fn test_sigma_clip_keeps_clean_data() {
        let values = vec![1.0, 1.1, 0.9, 1.05, 0.95];
        let stats = sigma_clipped_stats(&values, 3.0, 5).unwrap();
        assert_eq!(stats.n_used, 5);
    }

    #[test]
    fn test_sigma_clip_constant_input() {
        let stats = sigma_clipped_stats(&[7.0; 10], 3.0, 5).unwrap();
        assert_eq!(stats.n_used, 10);
        assert_eq!(stats.median, 7.0);
        assert_eq!(stats.sigma, 0.0);
    }

    #[test]
    fn test_sigma_clip_empty() {
        assert!(sigma_clipped_stats(&[], 3.0, 5).is_err());
        assert!(sigma_clipped_stats(&[f64::NAN], 3.0, 5).is_err());
    }

    #[test]
    fn test_median_standard_error() {
        assert_eq!(median_standard_error(2.0, 1), 0.0);
        assert_relative_eq!(
            median_standard_error(2.0, 4),
            MEDIAN_SE_FACTOR,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_median_robust_to_single_outlier() {
        // One 10x outlier among five valid widths must not move the median.
        let clean = [3.0, 3.1, 2.9, 3.05, 2.95];
        let with_outlier = [3.0, 3.1, 2.9, 3.05, 2.95, 30.0];

        let m_clean = median(&clean).unwrap();
        let m_outlier = median(&with_outlier).unwrap();
        assert_relative_eq!(m_clean, m_outlier, epsilon = 0.06);
    }
}
